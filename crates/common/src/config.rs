use std::str::FromStr;

use serde::Deserialize;

/// What a handler reports once every delivery attempt has failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Log the failure and acknowledge the message so it leaves the queue.
    #[default]
    Acknowledge,
    /// Report a handler error so the message is negatively acknowledged and
    /// the broker's redelivery / dead-letter policy takes over.
    Requeue,
}

impl FromStr for ExhaustionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ack" | "acknowledge" => Ok(Self::Acknowledge),
            "requeue" | "nack" => Ok(Self::Requeue),
            other => Err(anyhow::anyhow!(
                "RETRY_EXHAUSTION_POLICY must be `ack` or `requeue`, got `{other}`"
            )),
        }
    }
}

impl std::fmt::Display for ExhaustionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExhaustionPolicy::Acknowledge => write!(f, "ack"),
            ExhaustionPolicy::Requeue => write!(f, "requeue"),
        }
    }
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Redis connection string (the Streams broker)
    pub redis_url: String,

    /// Topic and subscription for regular emails
    pub email_topic: String,
    pub email_subscription: String,

    /// Topic and subscription for verification emails
    pub verification_topic: String,
    pub verification_subscription: String,

    /// Topic and subscription for user creation events
    pub user_topic: String,
    pub user_subscription: String,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub resend_from_email: Option<String>,

    /// Resend API base URL (overridable for tests and proxies)
    pub resend_base_url: String,

    /// Minimum spacing between two Resend requests (default: 600, under 2 req/s)
    pub resend_send_interval_ms: u64,

    /// Upper bound on one Resend request, connect to response body (default: 10000)
    pub resend_timeout_ms: u64,

    /// Company name rendered into every template
    pub company_name: String,

    /// Delivery attempts per message (default: 3)
    pub retry_max_attempts: u32,

    /// Constant delay between delivery attempts in milliseconds (default: 2000)
    pub retry_delay_ms: u64,

    /// Outcome reported once all delivery attempts failed
    pub retry_exhaustion_policy: ExhaustionPolicy,

    /// Messages fetched per broker read
    pub broker_batch_size: usize,

    /// How long a broker read blocks waiting for new messages
    pub broker_block_ms: u64,

    /// Idle time after which an unacknowledged message is redelivered
    pub broker_redelivery_idle_ms: u64,

    /// Deliveries after which a message is moved to the dead-letter stream
    pub broker_max_deliveries: u64,

    /// Port the publishing API listens on
    pub api_port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset so that `KEY=` in a `.env` file falls
    /// back to the default.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            redis_url: or("REDIS_URL", "redis://localhost:6379"),
            email_topic: or("EMAIL_TOPIC", "northfi.email.processing.v1"),
            email_subscription: or("EMAIL_SUBSCRIPTION", "northfi.email.processing.worker.v1"),
            verification_topic: or("VERIFICATION_TOPIC", "northfi.email.verification.v1"),
            verification_subscription: or(
                "VERIFICATION_SUBSCRIPTION",
                "northfi.email.verification.worker.v1",
            ),
            user_topic: or("USER_TOPIC", "northfi.user.creation.v1"),
            user_subscription: or("USER_SUBSCRIPTION", "northfi.user.creation.worker.v1"),
            resend_api_key: get("RESEND_API_KEY"),
            resend_from_email: get("RESEND_FROM_EMAIL"),
            resend_base_url: or("RESEND_BASE_URL", "https://api.resend.com"),
            resend_send_interval_ms: or("RESEND_SEND_INTERVAL_MS", "600")
                .parse()
                .map_err(|_| anyhow::anyhow!("RESEND_SEND_INTERVAL_MS must be a valid u64"))?,
            resend_timeout_ms: or("RESEND_TIMEOUT_MS", "10000")
                .parse()
                .map_err(|_| anyhow::anyhow!("RESEND_TIMEOUT_MS must be a valid u64"))?,
            company_name: or("COMPANY_NAME", "NorthFi"),
            retry_max_attempts: or("RETRY_MAX_ATTEMPTS", "3")
                .parse()
                .map_err(|_| anyhow::anyhow!("RETRY_MAX_ATTEMPTS must be a valid u32"))?,
            retry_delay_ms: or("RETRY_DELAY_MS", "2000")
                .parse()
                .map_err(|_| anyhow::anyhow!("RETRY_DELAY_MS must be a valid u64"))?,
            retry_exhaustion_policy: or("RETRY_EXHAUSTION_POLICY", "ack").parse()?,
            broker_batch_size: or("BROKER_BATCH_SIZE", "10")
                .parse()
                .map_err(|_| anyhow::anyhow!("BROKER_BATCH_SIZE must be a valid usize"))?,
            broker_block_ms: or("BROKER_BLOCK_MS", "2000")
                .parse()
                .map_err(|_| anyhow::anyhow!("BROKER_BLOCK_MS must be a valid u64"))?,
            broker_redelivery_idle_ms: or("BROKER_REDELIVERY_IDLE_MS", "10000")
                .parse()
                .map_err(|_| anyhow::anyhow!("BROKER_REDELIVERY_IDLE_MS must be a valid u64"))?,
            broker_max_deliveries: or("BROKER_MAX_DELIVERIES", "5")
                .parse()
                .map_err(|_| anyhow::anyhow!("BROKER_MAX_DELIVERIES must be a valid u64"))?,
            api_port: or("API_PORT", "8080")
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid port number"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.redis_url, "redis://localhost:6379");
        assert_eq!(config.email_topic, "northfi.email.processing.v1");
        assert_eq!(config.user_subscription, "northfi.user.creation.worker.v1");
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.retry_delay_ms, 2000);
        assert_eq!(config.retry_exhaustion_policy, ExhaustionPolicy::Acknowledge);
        assert_eq!(config.company_name, "NorthFi");
        assert!(config.resend_api_key.is_none());
        assert_eq!(config.resend_timeout_ms, 10_000);
        assert_eq!(config.api_port, 8080);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("EMAIL_TOPIC", "custom.topic"),
            ("RESEND_API_KEY", "re_123"),
            ("RETRY_MAX_ATTEMPTS", "5"),
            ("RETRY_EXHAUSTION_POLICY", "requeue"),
            ("RESEND_TIMEOUT_MS", "2500"),
        ])
        .unwrap();
        assert_eq!(config.email_topic, "custom.topic");
        assert_eq!(config.resend_api_key.as_deref(), Some("re_123"));
        assert_eq!(config.retry_max_attempts, 5);
        assert_eq!(config.retry_exhaustion_policy, ExhaustionPolicy::Requeue);
        assert_eq!(config.resend_timeout_ms, 2500);
    }

    #[test]
    fn test_empty_value_falls_back_to_default() {
        let config = load(&[("COMPANY_NAME", ""), ("RESEND_FROM_EMAIL", "  ")]).unwrap();
        assert_eq!(config.company_name, "NorthFi");
        assert!(config.resend_from_email.is_none());
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = load(&[("RETRY_DELAY_MS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("RETRY_DELAY_MS"));
    }

    #[test]
    fn test_invalid_policy_is_rejected() {
        assert!(load(&[("RETRY_EXHAUSTION_POLICY", "drop")]).is_err());
    }
}
