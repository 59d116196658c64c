use axum::{extract::State, Json};

use crate::error::{ApiResponse, AppError, Result};
use crate::models::{
    AuditEvent, AuditEventKind, ClientInfo, CreateUserRequest, LoginRequest, LoginResponse,
    UserResponse,
};
use crate::services::AuthService;
use crate::AppState;

/// Register a new principal
/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    let user = AuthService::register(&state.db, req).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// Login user
/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>> {
    match AuthService::login(&state.db, &state.config, req).await {
        Ok(response) => {
            tracing::info!(
                user_id = %response.user.id,
                source = %client.address,
                "Login succeeded"
            );
            Ok(Json(ApiResponse::success(response)))
        }
        Err(e @ AppError::Unauthorized(_)) => {
            tracing::warn!(source = %client.address, "Login failed");
            state
                .audit
                .append(
                    AuditEvent::new(AuditEventKind::AuthFailed, &client, state.clock.now())
                        .with_detail(serde_json::json!({ "path": "/api/v1/auth/login" })),
                )
                .await;
            Err(e)
        }
        Err(e) => Err(e),
    }
}
