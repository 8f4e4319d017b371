use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use mailer_broker::Broker;
use mailer_common::error::AppError;
use mailer_common::types::UserPayload;

use crate::routes::publish;
use crate::state::AppState;

pub fn router<B: Broker>() -> Router<AppState<B>> {
    Router::new().route("/create-user", post(create_user::<B>))
}

/// POST /create-user: Publish a user creation event; the worker sends the
/// welcome email.
async fn create_user<B: Broker>(
    State(state): State<AppState<B>>,
    Json(payload): Json<UserPayload>,
) -> Result<Json<Value>, AppError> {
    let id = publish(state.broker.as_ref(), &state.topics.user, &payload).await?;

    Ok(Json(json!({
        "message": format!("User creation message published with ID: {id}"),
        "id": id,
        "user": payload,
    })))
}
