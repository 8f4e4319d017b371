use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use mailer_broker::Broker;
use mailer_common::error::AppError;
use mailer_common::types::EmailPayload;

use crate::routes::publish;
use crate::state::AppState;

pub fn router<B: Broker>() -> Router<AppState<B>> {
    Router::new().route("/send-email", post(send_email::<B>))
}

/// POST /send-email: Queue a regular email.
async fn send_email<B: Broker>(
    State(state): State<AppState<B>>,
    Json(payload): Json<EmailPayload>,
) -> Result<Json<Value>, AppError> {
    let id = publish(state.broker.as_ref(), &state.topics.email, &payload).await?;

    Ok(Json(json!({
        "message": format!("Mensagem publicada com ID: {id}"),
        "id": id,
    })))
}
