use std::future::Future;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A required setting is missing; every send fails until it is provided.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("failed to send email: {0}")]
    Http(#[from] reqwest::Error),

    #[error("email provider returned status {status}: {detail}")]
    Rejected { status: u16, detail: String },
}

/// Outbound email delivery.
///
/// Each call makes one delivery attempt; retries belong to the caller.
pub trait Mailer: Send + Sync + 'static {
    fn send_plain_text(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;

    fn send_html(
        &self,
        to: &str,
        subject: &str,
        html: &str,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}
