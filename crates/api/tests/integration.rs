//! Integration tests for API routes.
//!
//! Uses `tower::ServiceExt` to test Axum routes without a real HTTP server,
//! publishing into the in-memory broker.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use mailer_api::routes::create_router;
use mailer_api::state::AppState;
use mailer_broker::{AckDecision, Broker, BrokerError, InMemoryBroker, Message, Subscription, Topic};
use mailer_common::codec::Payload;
use mailer_common::config::AppConfig;
use mailer_common::types::{EmailPayload, UserPayload, VerificationEmailPayload};

// ============================================================
// Helpers
// ============================================================

fn test_config() -> AppConfig {
    AppConfig::from_lookup(|_| None).unwrap()
}

async fn build_app() -> (Router, Arc<InMemoryBroker>, AppConfig) {
    let config = test_config();
    let broker = Arc::new(InMemoryBroker::new());
    let state = AppState::provision(Arc::clone(&broker), &config)
        .await
        .unwrap();
    (create_router(state), broker, config)
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

// ============================================================
// Routes
// ============================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _, _) = build_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "mailer-api");
}

#[tokio::test]
async fn test_send_email_publishes_to_email_topic() {
    let (app, broker, config) = build_app().await;

    let (status, json) = post_json(
        app,
        "/send-email",
        json!({ "to": "a@x.com", "subject": "Oi", "body": "Olá!" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let id = json["id"].as_str().unwrap();
    assert_eq!(json["message"], format!("Mensagem publicada com ID: {id}"));

    let published = broker.published(&config.email_topic).await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].id, id);
    let payload = EmailPayload::decode(&published[0].data).unwrap();
    assert_eq!(payload.to, "a@x.com");
    assert_eq!(payload.body, "Olá!");
}

#[tokio::test]
async fn test_send_email_rejects_missing_fields() {
    let (app, broker, config) = build_app().await;

    let (status, json) = post_json(app, "/send-email", json!({ "to": "a@x.com", "subject": "Oi" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("body"));
    assert!(broker.published(&config.email_topic).await.is_empty());
}

#[tokio::test]
async fn test_send_email_rejects_malformed_json() {
    let (app, broker, config) = build_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/send-email")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert!(broker.published(&config.email_topic).await.is_empty());
}

#[tokio::test]
async fn test_send_verification_email() {
    let (app, broker, config) = build_app().await;

    let (status, json) = post_json(
        app,
        "/send-verification-email",
        json!({ "to": "ana@example.com", "username": "ana", "code": "482913" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Verification email sent successfully");

    let published = broker.published(&config.verification_topic).await;
    let payload = VerificationEmailPayload::decode(&published[0].data).unwrap();
    assert_eq!(payload.code.as_deref(), Some("482913"));
    assert!(payload.verify_url.is_none());
}

#[tokio::test]
async fn test_send_verification_email_requires_code_or_link() {
    let (app, broker, config) = build_app().await;

    let (status, _) = post_json(
        app,
        "/send-verification-email",
        json!({ "to": "ana@example.com", "username": "ana" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(broker.published(&config.verification_topic).await.is_empty());
}

#[tokio::test]
async fn test_create_user_publishes_event() {
    let (app, broker, config) = build_app().await;

    let user = json!({ "id": "u-1", "email": "ana@example.com", "name": "Ana" });
    let (status, json) = post_json(app, "/create-user", user.clone()).await;

    assert_eq!(status, StatusCode::OK);
    let id = json["id"].as_str().unwrap();
    assert_eq!(
        json["message"],
        format!("User creation message published with ID: {id}")
    );
    assert_eq!(json["user"], user);

    let published = broker.published(&config.user_topic).await;
    let payload = UserPayload::decode(&published[0].data).unwrap();
    assert_eq!(payload.name, "Ana");
}

// ============================================================
// Broker failures
// ============================================================

/// Broker that accepts provisioning but refuses every publish.
struct UnavailableBroker;

impl Broker for UnavailableBroker {
    async fn ensure_topic(&self, name: &str) -> Result<Topic, BrokerError> {
        Ok(Topic::new(name))
    }

    async fn ensure_subscription(&self, name: &str, topic: &Topic) -> Result<Subscription, BrokerError> {
        Ok(Subscription::new(name, topic))
    }

    async fn publish(&self, topic: &Topic, _data: Vec<u8>) -> Result<String, BrokerError> {
        Err(BrokerError::UnknownTopic(topic.name().to_string()))
    }

    async fn receive<H, Fut>(
        &self,
        subscription: &Subscription,
        _cancel: CancellationToken,
        _handler: H,
    ) -> Result<(), BrokerError>
    where
        H: Fn(Message) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = AckDecision> + Send + 'static,
    {
        Err(BrokerError::UnknownSubscription(subscription.name().to_string()))
    }
}

#[tokio::test]
async fn test_broker_failure_maps_to_internal_error() {
    let state = AppState::provision(Arc::new(UnavailableBroker), &test_config())
        .await
        .unwrap();
    let app = create_router(state);

    let (status, json) = post_json(
        app,
        "/send-email",
        json!({ "to": "a@x.com", "subject": "Oi", "body": "Olá!" }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("Broker error"));
}
