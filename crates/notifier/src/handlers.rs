//! Email handlers, one per payload kind.
//!
//! A handler renders its template and sends it through the retry executor.
//! `Ok(())` means the message is done with (acknowledge it); `Err` means it
//! should be negatively acknowledged.

use std::sync::Arc;

use thiserror::Error;
use tracing::Instrument;

use mailer_common::config::{AppConfig, ExhaustionPolicy};
use mailer_common::types::{
    EmailPayload, PayloadKind, UserPayload, VerificationEmailPayload, VerificationTarget,
};

use crate::delivery::Mailer;
use crate::retry::{RetryPolicy, RetryReport, execute_with_retry};
use crate::templates;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{kind} email to {recipient} not delivered after {attempts} attempts: {last_error}")]
    DeliveryExhausted {
        kind: PayloadKind,
        recipient: String,
        attempts: u32,
        last_error: String,
    },

    #[error("failed to send welcome email: {0}")]
    WelcomeEmail(#[source] Box<HandlerError>),
}

pub struct EmailHandlers<M> {
    mailer: Arc<M>,
    retry: RetryPolicy,
    on_exhausted: ExhaustionPolicy,
    company: String,
}

impl<M: Mailer> EmailHandlers<M> {
    pub fn new(mailer: Arc<M>, company: impl Into<String>) -> Self {
        Self {
            mailer,
            retry: RetryPolicy::default(),
            on_exhausted: ExhaustionPolicy::default(),
            company: company.into(),
        }
    }

    pub fn from_config(mailer: Arc<M>, config: &AppConfig) -> Self {
        Self::new(mailer, config.company_name.clone())
            .with_retry_policy(RetryPolicy::new(
                config.retry_max_attempts,
                std::time::Duration::from_millis(config.retry_delay_ms),
            ))
            .with_exhaustion_policy(config.retry_exhaustion_policy)
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_exhaustion_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.on_exhausted = policy;
        self
    }

    /// Regular email rendered with the default template.
    pub async fn handle_email(&self, payload: &EmailPayload) -> Result<(), HandlerError> {
        tracing::info!(recipient = %payload.to, subject = %payload.subject, "Processing email");

        let html = templates::default_email(&payload.subject, &payload.body, &self.company);
        self.deliver(PayloadKind::Email, &payload.to, &payload.subject, &html)
            .await
    }

    /// Welcome email addressed to `name`. The payload body is shown under
    /// the greeting.
    pub async fn handle_welcome(&self, payload: &EmailPayload, name: &str) -> Result<(), HandlerError> {
        tracing::info!(recipient = %payload.to, user_name = name, "Processing welcome email");

        let html = templates::welcome_email(name, &payload.body, &self.company);
        self.deliver(PayloadKind::Email, &payload.to, &payload.subject, &html)
            .await
    }

    pub async fn handle_verification(
        &self,
        payload: &VerificationEmailPayload,
    ) -> Result<(), HandlerError> {
        tracing::info!(
            recipient = %payload.to,
            username = %payload.username,
            "Processing verification email"
        );

        let (subject, html) = match payload.target() {
            Some(VerificationTarget::Code(code)) => (
                format!("Seu código de verificação - {}", self.company),
                templates::verification_code_email(&payload.username, &self.company, code),
            ),
            Some(VerificationTarget::Link(url)) => (
                format!("Verifique seu email - {}", self.company),
                templates::verification_link_email(&payload.username, &self.company, url),
            ),
            // Retrying cannot make a code or link appear: drop it.
            None => {
                tracing::error!(
                    recipient = %payload.to,
                    username = %payload.username,
                    "Verification payload has neither code nor link, skipping"
                );
                return Ok(());
            }
        };

        self.deliver(PayloadKind::Verification, &payload.to, &subject, &html)
            .await
    }

    /// Build the welcome email for a new user and hand it to the welcome
    /// handler.
    pub async fn handle_user_created(&self, payload: &UserPayload) -> Result<(), HandlerError> {
        tracing::info!(
            user_id = %payload.id,
            user_email = %payload.email,
            user_name = %payload.name,
            "Processing user creation"
        );

        let company = &self.company;
        let welcome = EmailPayload {
            to: payload.email.clone(),
            subject: format!("Bem-vindo(a) à {company}!"),
            body: format!(
                "Olá {},\n\nSeja bem-vindo(a) à {company}! Sua conta foi criada com sucesso.\n\nID do usuário: {}\nEmail: {}\n\nObrigado por se juntar a nós!\n\nEquipe {company}",
                payload.name, payload.id, payload.email
            ),
        };

        if let Err(e) = self.handle_welcome(&welcome, &payload.name).await {
            tracing::error!(user_id = %payload.id, error = %e, "Failed to send welcome email");
            return Err(HandlerError::WelcomeEmail(Box::new(e)));
        }

        tracing::info!(user_id = %payload.id, "User creation processed");
        Ok(())
    }

    async fn deliver(
        &self,
        kind: PayloadKind,
        recipient: &str,
        subject: &str,
        html: &str,
    ) -> Result<(), HandlerError> {
        let mailer = &*self.mailer;
        let span = tracing::info_span!("deliver", %kind, recipient);

        let report = execute_with_retry(self.retry, move || mailer.send_html(recipient, subject, html))
            .instrument(span)
            .await;

        match report {
            RetryReport::Succeeded { attempts } => {
                tracing::info!(%kind, recipient, attempts, "Email sent");
                Ok(())
            }
            RetryReport::Exhausted {
                attempts,
                last_error,
            } => match self.on_exhausted {
                ExhaustionPolicy::Acknowledge => {
                    tracing::error!(
                        %kind,
                        recipient,
                        attempts,
                        error = %last_error,
                        "Email not delivered, giving up"
                    );
                    Ok(())
                }
                ExhaustionPolicy::Requeue => Err(HandlerError::DeliveryExhausted {
                    kind,
                    recipient: recipient.to_string(),
                    attempts,
                    last_error,
                }),
            },
        }
    }
}
