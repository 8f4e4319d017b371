use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use mailer_broker::Broker;
use mailer_common::error::AppError;
use mailer_common::types::VerificationEmailPayload;

use crate::routes::publish;
use crate::state::AppState;

pub fn router<B: Broker>() -> Router<AppState<B>> {
    Router::new().route("/send-verification-email", post(send_verification_email::<B>))
}

/// POST /send-verification-email: Queue a verification code or link email.
async fn send_verification_email<B: Broker>(
    State(state): State<AppState<B>>,
    Json(payload): Json<VerificationEmailPayload>,
) -> Result<Json<Value>, AppError> {
    let id = publish(state.broker.as_ref(), &state.topics.verification, &payload).await?;

    Ok(Json(json!({
        "message": "Verification email sent successfully",
        "id": id,
    })))
}
