//! Resend delivery client.
//!
//! Sends `POST {base_url}/emails` with a bearer key. Sends are paced: at
//! most one request per `send_interval` leaves this client, which keeps
//! concurrent handlers under the provider's rate limit. Each request is
//! bounded by `timeout`; an expired request is an ordinary
//! [`DeliveryError::Http`] failure.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use mailer_common::config::AppConfig;

use crate::delivery::{DeliveryError, Mailer};

const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(600);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

enum Content<'a> {
    Html(&'a str),
    Text(&'a str),
}

pub struct ResendClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    from: Option<String>,
    send_interval: Duration,
    timeout: Duration,
    last_send: Mutex<Option<Instant>>,
}

impl ResendClient {
    /// A client with missing credentials can be built; its sends fail with
    /// [`DeliveryError::NotConfigured`].
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        from: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            from,
            send_interval: DEFAULT_SEND_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            last_send: Mutex::new(None),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.resend_base_url.clone(),
            config.resend_api_key.clone(),
            config.resend_from_email.clone(),
        )
        .with_send_interval(Duration::from_millis(config.resend_send_interval_ms))
        .with_timeout(Duration::from_millis(config.resend_timeout_ms))
    }

    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether both the API key and the sender address are set.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.from.is_some()
    }

    /// Wait until `send_interval` has passed since the previous send.
    async fn pace(&self) {
        let mut last_send = self.last_send.lock().await;
        if let Some(previous) = *last_send {
            tokio::time::sleep_until(previous + self.send_interval).await;
        }
        *last_send = Some(Instant::now());
    }

    async fn send(&self, to: &str, subject: &str, content: Content<'_>) -> Result<String, DeliveryError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(DeliveryError::NotConfigured("RESEND_API_KEY"))?;
        let from = self
            .from
            .as_deref()
            .ok_or(DeliveryError::NotConfigured("RESEND_FROM_EMAIL"))?;

        let (html, text) = match content {
            Content::Html(html) => (Some(html), None),
            Content::Text(text) => (None, Some(text)),
        };
        let request = SendEmailRequest {
            from,
            to: [to],
            subject,
            html,
            text,
        };

        self.pace().await;

        let response = self
            .http
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let body: SendEmailResponse = response.json().await?;
        tracing::info!(email_id = %body.id, recipient = to, "Email accepted by Resend");

        Ok(body.id)
    }
}

impl Mailer for ResendClient {
    async fn send_plain_text(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        self.send(to, subject, Content::Text(body)).await.map(|_| ())
    }

    async fn send_html(&self, to: &str, subject: &str, html: &str) -> Result<(), DeliveryError> {
        self.send(to, subject, Content::Html(html)).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_api_key_fails_fast() {
        let client = ResendClient::new("http://127.0.0.1:9", None, Some("a@b.com".into()));
        assert!(!client.is_configured());

        let err = client.send_html("x@y.com", "s", "<p>b</p>").await.unwrap_err();
        assert!(matches!(err, DeliveryError::NotConfigured("RESEND_API_KEY")));
    }

    #[tokio::test]
    async fn test_missing_sender_fails_fast() {
        let client = ResendClient::new("http://127.0.0.1:9", Some("re_key".into()), None);

        let err = client.send_plain_text("x@y.com", "s", "b").await.unwrap_err();
        assert!(matches!(err, DeliveryError::NotConfigured("RESEND_FROM_EMAIL")));
    }

    #[test]
    fn test_request_shape() {
        let request = SendEmailRequest {
            from: "no-reply@northfi.com.br",
            to: ["ana@example.com"],
            subject: "Oi",
            html: Some("<p>Oi</p>"),
            text: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "from": "no-reply@northfi.com.br",
                "to": ["ana@example.com"],
                "subject": "Oi",
                "html": "<p>Oi</p>"
            })
        );
    }

    #[test]
    fn test_timeout_defaults_and_overrides() {
        let client = ResendClient::new("https://api.resend.com", None, None);
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);

        let config = AppConfig::from_lookup(|key| {
            (key == "RESEND_TIMEOUT_MS").then(|| "250".to_string())
        })
        .unwrap();
        let client = ResendClient::from_config(&config);
        assert_eq!(client.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = ResendClient::new("https://api.resend.com/", None, None);
        assert_eq!(client.base_url, "https://api.resend.com");
    }
}
