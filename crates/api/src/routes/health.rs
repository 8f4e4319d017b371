//! Health check endpoint.

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use mailer_broker::Broker;

use crate::state::AppState;

pub fn router<B: Broker>() -> Router<AppState<B>> {
    Router::new().route("/health", get(health_check))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "mailer-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
