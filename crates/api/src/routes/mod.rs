pub mod email;
pub mod health;
pub mod users;
pub mod verification;

use axum::Router;

use mailer_broker::{Broker, Topic};
use mailer_common::codec::Payload;
use mailer_common::error::AppError;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router<B: Broker>(state: AppState<B>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(email::router())
        .merge(verification::router())
        .merge(users::router())
        .with_state(state)
}

/// Validate, encode and publish a payload; returns the message id.
pub(crate) async fn publish<B: Broker, P: Payload>(
    broker: &B,
    topic: &Topic,
    payload: &P,
) -> Result<String, AppError> {
    payload.check()?;
    let data = payload
        .encode()
        .map_err(|e| AppError::Internal(format!("failed to encode {} payload: {e}", P::KIND)))?;

    let id = broker
        .publish(topic, data)
        .await
        .map_err(|e| AppError::Broker(e.to_string()))?;

    tracing::info!(kind = %P::KIND, topic = topic.name(), message_id = %id, "Message published");
    Ok(id)
}
