use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sealdrop::clock::{Clock, SystemClock};
use sealdrop::config::Config;
use sealdrop::db::Database;
use sealdrop::services::{rate_limit, sweep};
use sealdrop::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sealdrop=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting sealdrop...");

    // Load configuration
    let config = Arc::new(Config::load()?);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.database.path).await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState::new(db, config.clone(), clock);

    // Background maintenance
    sweep::spawn_expiry_sweep(
        state.registry.clone(),
        Duration::from_secs(config.files.sweep_interval_secs),
    );
    rate_limit::spawn_window_cleanup(
        state.limiter.clone(),
        Duration::from_secs(config.rate_limit.window_secs),
    );

    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
