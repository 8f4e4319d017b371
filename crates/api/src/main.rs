//! Email API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use mailer_broker::{RedisStreamsBroker, StreamOptions};
use mailer_common::config::AppConfig;
use mailer_common::redis_pool::create_redis_pool;

use mailer_api::routes::create_router;
use mailer_api::state::AppState;

/// Email bodies are small; anything larger is rejected before parsing.
const MAX_BODY_BYTES: usize = 256 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("mailer_api=debug,mailer_broker=info,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting email API server...");

    let config = AppConfig::from_env()?;

    let (client, conn) = create_redis_pool(&config.redis_url).await?;
    let broker = Arc::new(RedisStreamsBroker::new(client, conn, StreamOptions::default()));

    let state = AppState::provision(broker, &config).await?;
    tracing::info!("Topics provisioned");

    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await?;

    Ok(())
}
