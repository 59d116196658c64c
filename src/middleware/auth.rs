use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

use crate::error::AppError;
use crate::middleware::client::client_info;
use crate::models::{AuditEvent, AuditEventKind, CurrentUser};
use crate::services::AuthService;
use crate::AppState;

/// Authentication middleware
/// Extracts and validates JWT from Authorization header
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Owned copies only: nothing borrowed from the request may live across an await
    let token = bearer_token(request.headers()).map(str::to_string);
    let path = request.uri().path().to_string();

    match authenticate(&state, token).await {
        Ok(current_user) => {
            request.extensions_mut().insert(current_user);
            Ok(next.run(request).await)
        }
        Err(e) => {
            let client = client_info(
                request.headers(),
                request.extensions().get::<ConnectInfo<SocketAddr>>(),
                state.config.server.trust_forwarded_for,
            );
            state
                .audit
                .append(
                    AuditEvent::new(AuditEventKind::AuthFailed, &client, state.clock.now())
                        .with_detail(serde_json::json!({ "path": path })),
                )
                .await;
            Err(e)
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

async fn authenticate(state: &AppState, token: Option<String>) -> Result<CurrentUser, AppError> {
    let token = token.ok_or_else(|| {
        AppError::Unauthorized("Missing or invalid Authorization header".to_string())
    })?;

    let claims = AuthService::validate_token(&token, &state.config)?;

    // The principal must still exist
    let email: String = sqlx::query_scalar("SELECT email FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(state.db.pool())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))?;

    Ok(CurrentUser {
        id: claims.sub,
        email,
    })
}
