use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Extension, Json,
};
use bytes::Bytes;

use crate::error::{ApiResponse, AppError, Result};
use crate::models::{
    AuditEvent, AuditEventKind, ClientInfo, CurrentUser, FileRecord, FileResponse, NewFile,
    UploadResponse,
};
use crate::AppState;

/// Upload an encrypted blob
/// POST /api/v1/files/upload
///
/// Multipart fields: `file` (ciphertext), `iv`, `filename`, `mime_type`,
/// optional `ttl_hours`.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    client: ClientInfo,
    multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResponse>>> {
    let now = state.clock.now();

    match receive_upload(&state, &current_user, multipart).await {
        Ok(record) => {
            state
                .audit
                .append(
                    AuditEvent::new(AuditEventKind::UploadOk, &client, now)
                        .with_file(&record.id)
                        .with_detail(serde_json::json!({ "size_bytes": record.size_bytes })),
                )
                .await;
            Ok(Json(ApiResponse::success(UploadResponse {
                id: record.id,
                expiry_at: record.expiry_at,
            })))
        }
        Err(e) => {
            let reason = if e.is_internal() {
                "internal".to_string()
            } else {
                e.to_string()
            };
            tracing::warn!(user_id = %current_user.id, reason = %reason, "Upload rejected");
            state
                .audit
                .append(
                    AuditEvent::new(AuditEventKind::UploadFailed, &client, now)
                        .with_detail(serde_json::json!({ "reason": reason })),
                )
                .await;
            Err(e)
        }
    }
}

async fn receive_upload(
    state: &AppState,
    current_user: &CurrentUser,
    mut multipart: Multipart,
) -> Result<FileRecord> {
    let mut new_file = NewFile::default();
    let mut data: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                data = Some(field.bytes().await.map_err(multipart_error)?);
            }
            "iv" => new_file.iv = field.text().await.map_err(multipart_error)?,
            "filename" => new_file.filename = field.text().await.map_err(multipart_error)?,
            "mime_type" => new_file.mime_type = field.text().await.map_err(multipart_error)?,
            "ttl_hours" => {
                let text = field.text().await.map_err(multipart_error)?;
                let hours = text.trim().parse::<u32>().map_err(|_| {
                    AppError::InvalidInput("ttl_hours must be a non-negative integer".to_string())
                })?;
                new_file.ttl_hours = Some(hours);
            }
            _ => {}
        }
    }

    let data = data.ok_or_else(|| AppError::InvalidInput("No file provided".to_string()))?;

    state
        .registry
        .store_upload(&current_user.id, &new_file, data)
        .await
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Upload exceeds the size limit".to_string())
    } else {
        AppError::InvalidInput(format!("Failed to process multipart: {}", e.body_text()))
    }
}

/// List the caller's files, newest first
/// GET /api/v1/files
pub async fn list_files(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<FileResponse>>>> {
    let files = state
        .registry
        .list_by_owner(&current_user.id)
        .await?
        .into_iter()
        .map(FileResponse::from)
        .collect();
    Ok(Json(ApiResponse::success(files)))
}

/// Delete one of the caller's files
/// DELETE /api/v1/files/:id
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    state.registry.delete_owned(&id, &current_user.id).await?;
    Ok(Json(ApiResponse::<()>::success_message("File deleted")))
}
