//! Keeper API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use keeper_backup::queue::BackupQueue;
use keeper_common::config::AppConfig;
use keeper_common::db::create_pool;
use keeper_common::redis_pool::create_redis_pool;

use keeper_api::routes::create_router;
use keeper_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "keeper_api=debug,keeper_notifier=debug,keeper_backup=debug,keeper_audit=debug,tower_http=debug",
            )
        }))
        .init();

    tracing::info!("Starting Keeper API server...");

    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("Database pool created");

    // Backup jobs are only enqueued here; the worker consumes them
    let redis = create_redis_pool(&config.redis_url).await?;
    let queue = Arc::new(BackupQueue::new(redis));

    let port = config.api_port;
    let state = AppState::new(pool, config, queue)?;

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
