//! Shared application state for the Axum API server.

use std::sync::Arc;

use mailer_broker::{Broker, BrokerError, Topic};
use mailer_common::config::AppConfig;

/// The topics the API publishes to.
#[derive(Debug, Clone)]
pub struct Topics {
    pub email: Topic,
    pub verification: Topic,
    pub user: Topic,
}

/// Application state shared across all route handlers via Axum `State`.
pub struct AppState<B> {
    pub broker: Arc<B>,
    pub topics: Arc<Topics>,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            broker: Arc::clone(&self.broker),
            topics: Arc::clone(&self.topics),
        }
    }
}

impl<B: Broker> AppState<B> {
    /// Ensure every configured topic exists and build the state around them.
    pub async fn provision(broker: Arc<B>, config: &AppConfig) -> Result<Self, BrokerError> {
        let topics = Topics {
            email: broker.ensure_topic(&config.email_topic).await?,
            verification: broker.ensure_topic(&config.verification_topic).await?,
            user: broker.ensure_topic(&config.user_topic).await?,
        };

        Ok(Self {
            broker,
            topics: Arc::new(topics),
        })
    }
}
