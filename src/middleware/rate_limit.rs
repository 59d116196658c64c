use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

use crate::error::AppError;
use crate::middleware::client::client_info;
use crate::models::{AuditEvent, AuditEventKind};
use crate::services::RatePolicy;
use crate::AppState;

/// Reject the request before any handler runs once `policy` is exhausted for its source
async fn enforce(
    state: &AppState,
    policy: RatePolicy,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_info(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
        state.config.server.trust_forwarded_for,
    );

    if let Err(e) = state.limiter.check(policy, &client.address) {
        let path = request.uri().path().to_string();
        tracing::warn!(
            policy = policy.as_str(),
            source = %client.address,
            path = %path,
            "Rate limit exceeded"
        );
        state
            .audit
            .append(
                AuditEvent::new(AuditEventKind::RateLimited, &client, state.clock.now())
                    .with_detail(serde_json::json!({
                        "policy": policy.as_str(),
                        "path": path,
                    })),
            )
            .await;
        return Err(e);
    }

    Ok(next.run(request).await)
}

pub async fn limit_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    enforce(&state, RatePolicy::Auth, request, next).await
}

pub async fn limit_upload(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    enforce(&state, RatePolicy::Upload, request, next).await
}

pub async fn limit_download(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    enforce(&state, RatePolicy::Download, request, next).await
}
