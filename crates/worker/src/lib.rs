//! Email worker: provisions one topic/subscription pair per payload kind and
//! runs a subscription pump on each until shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use mailer_broker::{Broker, Subscription};
use mailer_common::config::AppConfig;
use mailer_common::types::PayloadKind;
use mailer_notifier::delivery::Mailer;
use mailer_notifier::handlers::EmailHandlers;
use mailer_notifier::pump::SubscriptionPump;

/// Where messages of one kind are published and consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub kind: PayloadKind,
    pub topic: String,
    pub subscription: String,
}

pub fn routes(config: &AppConfig) -> Vec<Route> {
    vec![
        Route {
            kind: PayloadKind::Email,
            topic: config.email_topic.clone(),
            subscription: config.email_subscription.clone(),
        },
        Route {
            kind: PayloadKind::Verification,
            topic: config.verification_topic.clone(),
            subscription: config.verification_subscription.clone(),
        },
        Route {
            kind: PayloadKind::UserCreated,
            topic: config.user_topic.clone(),
            subscription: config.user_subscription.clone(),
        },
    ]
}

/// Create every route's topic and subscription if missing.
///
/// Any failure aborts: the worker must not start with a partial set.
pub async fn provision<B: Broker>(
    broker: &B,
    routes: &[Route],
) -> anyhow::Result<Vec<(PayloadKind, Subscription)>> {
    let mut subscriptions = Vec::with_capacity(routes.len());

    for route in routes {
        let topic = broker
            .ensure_topic(&route.topic)
            .await
            .with_context(|| format!("failed to provision topic {}", route.topic))?;
        let subscription = broker
            .ensure_subscription(&route.subscription, &topic)
            .await
            .with_context(|| format!("failed to provision subscription {}", route.subscription))?;

        tracing::info!(
            kind = %route.kind,
            topic = %route.topic,
            subscription = %route.subscription,
            "Route ready"
        );
        subscriptions.push((route.kind, subscription));
    }

    Ok(subscriptions)
}

/// Run one pump per subscription until `cancel` fires.
///
/// The first pump to fail cancels the others; its error is returned once all
/// pumps have drained.
pub async fn run_pumps<B: Broker, M: Mailer>(
    broker: Arc<B>,
    handlers: Arc<EmailHandlers<M>>,
    subscriptions: Vec<(PayloadKind, Subscription)>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut pumps = JoinSet::new();

    for (kind, subscription) in subscriptions {
        let pump = SubscriptionPump::new(
            Arc::clone(&broker),
            subscription,
            kind,
            Arc::clone(&handlers),
        );
        let cancel = cancel.clone();
        pumps.spawn(async move {
            let name = pump.subscription().name().to_string();
            pump.run(cancel)
                .await
                .with_context(|| format!("subscription pump {name} failed"))
        });
    }

    let mut first_error = None;
    while let Some(result) = pumps.join_next().await {
        let error = match result {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(e) => anyhow::Error::new(e).context("subscription pump panicked"),
        };

        tracing::error!(error = ?error, "Stopping all pumps");
        cancel.cancel();
        first_error.get_or_insert(error);
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_follow_config() {
        let config = AppConfig::from_lookup(|key| match key {
            "EMAIL_TOPIC" => Some("custom.email".to_string()),
            _ => None,
        })
        .unwrap();

        let routes = routes(&config);
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[0].kind, PayloadKind::Email);
        assert_eq!(routes[0].topic, "custom.email");
        assert_eq!(routes[1].subscription, "northfi.email.verification.worker.v1");
        assert_eq!(routes[2].kind, PayloadKind::UserCreated);
        assert_eq!(routes[2].topic, "northfi.user.creation.v1");
    }
}
