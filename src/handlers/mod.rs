pub mod auth;
pub mod file;
pub mod public;

use axum::Json;

use crate::error::ApiResponse;

/// Liveness probe
/// GET /health
pub async fn health() -> Json<ApiResponse<()>> {
    Json(ApiResponse::<()>::success_message("ok"))
}
