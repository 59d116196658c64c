//! sealdrop: ciphertext-only file drop.
//!
//! Clients encrypt locally (see [`custody`]) and share links whose fragment
//! carries the key. The server side tracks blobs through
//! `Active -> Expired -> Deleted`, throttles and audits access, and never
//! holds plaintext or keys.

pub mod clock;
pub mod config;
pub mod custody;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod storage;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::clock::Clock;
use crate::config::Config;
use crate::db::Database;
use crate::services::{AuditSink, FileRegistry, RateLimiter, SqliteAuditSink};
use crate::storage::{BlobStore, LocalBlobStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub registry: Arc<FileRegistry>,
    pub limiter: Arc<RateLimiter>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wire the local blob store, the SQLite audit sink and the limiter around `db`
    pub fn new(db: Database, config: Arc<Config>, clock: Arc<dyn Clock>) -> Self {
        let blobs: Arc<dyn BlobStore> =
            Arc::new(LocalBlobStore::new(config.storage.local_path.clone()));
        tracing::info!(
            "Blob store: {} at {}",
            blobs.storage_type(),
            config.storage.local_path
        );

        let registry = Arc::new(FileRegistry::new(
            db.clone(),
            blobs,
            clock.clone(),
            &config.files,
        ));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit, clock.clone()));
        let audit: Arc<dyn AuditSink> = Arc::new(SqliteAuditSink::new(db.clone()));

        Self {
            db,
            config,
            registry,
            limiter,
            audit,
            clock,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::limit_auth,
        ));

    // Public share-link routes: no identity, download ceiling
    let public_routes = Router::new()
        .route("/public/files/:id", get(handlers::public::get_metadata))
        .route("/public/files/:id/blob", get(handlers::public::download_blob))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::limit_download,
        ));

    // Throttle first, then authenticate
    let upload_routes = Router::new()
        .route("/files/upload", post(handlers::file::upload_file))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::limit_upload,
        ))
        .layer(DefaultBodyLimit::max(state.config.storage.max_upload_bytes));

    let protected_routes = Router::new()
        .route("/files", get(handlers::file::list_files))
        .route("/files/:id", delete(handlers::file::delete_file))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .nest(
            "/api/v1",
            auth_routes
                .merge(public_routes)
                .merge(upload_routes)
                .merge(protected_routes),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
