use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use mailer_broker::{RedisStreamsBroker, StreamOptions};
use mailer_common::config::AppConfig;
use mailer_common::redis_pool::create_redis_pool;
use mailer_notifier::handlers::EmailHandlers;
use mailer_notifier::resend::ResendClient;
use mailer_worker::{provision, routes, run_pumps, shutdown_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mailer_worker=info,mailer_notifier=info,mailer_broker=info".into()
            }),
        )
        .json()
        .init();

    tracing::info!("Email worker starting...");

    let config = AppConfig::from_env()?;

    let (client, conn) = create_redis_pool(&config.redis_url).await?;
    let broker = Arc::new(RedisStreamsBroker::new(
        client,
        conn,
        StreamOptions {
            batch_size: config.broker_batch_size,
            block: Duration::from_millis(config.broker_block_ms),
            redelivery_idle: Duration::from_millis(config.broker_redelivery_idle_ms),
            max_deliveries: config.broker_max_deliveries,
            ..StreamOptions::default()
        },
    ));

    let mailer = Arc::new(ResendClient::from_config(&config));
    if !mailer.is_configured() {
        tracing::warn!("RESEND_API_KEY or RESEND_FROM_EMAIL not set, every delivery will fail");
    }
    let handlers = Arc::new(EmailHandlers::from_config(mailer, &config));

    let subscriptions = provision(broker.as_ref(), &routes(&config)).await?;

    tracing::info!(
        consumer = broker.consumer(),
        max_attempts = config.retry_max_attempts,
        retry_delay_ms = config.retry_delay_ms,
        exhaustion_policy = %config.retry_exhaustion_policy,
        "Worker ready, waiting for messages"
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Received shutdown signal, stopping gracefully...");
        signal_cancel.cancel();
    });

    let result = run_pumps(broker, handlers, subscriptions, cancel).await;
    if let Err(e) = &result {
        tracing::error!(error = ?e, "Email worker exited with error");
    }

    tracing::info!("Email worker stopped.");
    result
}
