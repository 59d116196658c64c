use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{ApiResponse, AppError, Result};
use crate::models::{AuditEvent, AuditEventKind, BlobResponse, ClientInfo, FileMetadata};
use crate::services::validate_file_id;
use crate::AppState;

/// Audit kind for a failed public lookup, if it warrants one
fn failure_kind(err: &AppError) -> Option<AuditEventKind> {
    match err {
        AppError::NotFound(_) => Some(AuditEventKind::NotFound),
        AppError::Expired(_) => Some(AuditEventKind::Expired),
        _ => None,
    }
}

async fn audit_malformed(state: &AppState, client: &ClientInfo, id: &str) {
    state
        .audit
        .append(
            AuditEvent::new(AuditEventKind::NotFound, client, state.clock.now()).with_detail(
                serde_json::json!({
                    "reason": "malformed_id",
                    "id": id.chars().take(64).collect::<String>(),
                }),
            ),
        )
        .await;
}

/// Public metadata for a share link. Never touches the blob or the counter.
/// GET /api/v1/public/files/:id
pub async fn get_metadata(
    State(state): State<AppState>,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<Response> {
    if let Err(e) = validate_file_id(&id) {
        audit_malformed(&state, &client, &id).await;
        return Err(e);
    }

    match state.registry.get_metadata(&id).await {
        Ok(record) => {
            let expired = state.registry.is_expired(&record)?;
            Ok(Json(ApiResponse::success(FileMetadata::found(record, expired))).into_response())
        }
        Err(AppError::NotFound(message)) => {
            state
                .audit
                .append(
                    AuditEvent::new(AuditEventKind::NotFound, &client, state.clock.now())
                        .with_file(&id),
                )
                .await;
            let body = ApiResponse {
                code: StatusCode::NOT_FOUND.as_u16() as i32,
                message,
                data: Some(FileMetadata::missing()),
            };
            Ok((StatusCode::NOT_FOUND, Json(body)).into_response())
        }
        Err(e) => Err(e),
    }
}

/// Ciphertext for a share link; counts the download
/// GET /api/v1/public/files/:id/blob
pub async fn download_blob(
    State(state): State<AppState>,
    client: ClientInfo,
    Path(id): Path<String>,
) -> Result<Response> {
    if let Err(e) = validate_file_id(&id) {
        audit_malformed(&state, &client, &id).await;
        return Err(e);
    }

    match state.registry.read_blob(&id).await {
        Ok((record, data)) => {
            state
                .audit
                .append(
                    AuditEvent::new(AuditEventKind::DownloadOk, &client, state.clock.now())
                        .with_file(&id),
                )
                .await;
            tracing::info!(file_id = %id, source = %client.address, "Blob downloaded");

            let body = BlobResponse {
                ciphertext: STANDARD.encode(&data),
                iv: record.iv,
                filename: record.filename,
                mime_type: record.mime_type,
                size_bytes: record.size_bytes,
            };
            Ok((
                [(header::CACHE_CONTROL, "no-store")],
                Json(ApiResponse::success(body)),
            )
                .into_response())
        }
        Err(e) => {
            if let Some(kind) = failure_kind(&e) {
                state
                    .audit
                    .append(AuditEvent::new(kind, &client, state.clock.now()).with_file(&id))
                    .await;
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind() {
        assert_eq!(
            failure_kind(&AppError::NotFound("x".into())),
            Some(AuditEventKind::NotFound)
        );
        assert_eq!(
            failure_kind(&AppError::Expired("x".into())),
            Some(AuditEventKind::Expired)
        );
        assert_eq!(failure_kind(&AppError::Internal("x".into())), None);
    }
}
