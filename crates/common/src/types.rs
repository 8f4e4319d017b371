use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kinds of payload travelling through the broker.
///
/// Each kind has its own topic/subscription pair; routing never inspects
/// payload contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Email,
    Verification,
    UserCreated,
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadKind::Email => write!(f, "email"),
            PayloadKind::Verification => write!(f, "verification"),
            PayloadKind::UserCreated => write!(f, "user_created"),
        }
    }
}

/// Reasons a payload fails its field checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("recipient email is required")]
    MissingRecipient,

    #[error("email subject is required")]
    MissingSubject,

    #[error("email body is required")]
    MissingBody,

    #[error("username is required")]
    MissingUsername,

    #[error("either a verification code or a verification URL is required")]
    MissingVerificationTarget,

    #[error("missing user ID")]
    MissingUserId,

    #[error("missing user email")]
    MissingUserEmail,

    #[error("missing user name")]
    MissingUserName,
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn is_blank_opt(value: Option<&str>) -> bool {
    value.is_none_or(is_blank)
}

/// A regular email message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPayload {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

impl EmailPayload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if is_blank(&self.to) {
            return Err(ValidationError::MissingRecipient);
        }
        if is_blank(&self.subject) {
            return Err(ValidationError::MissingSubject);
        }
        if is_blank(&self.body) {
            return Err(ValidationError::MissingBody);
        }
        Ok(())
    }
}

/// A request to send an email-address verification message.
///
/// Carries either a short code or a verification link; `token` is a legacy
/// field kept for publishers that still send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationEmailPayload {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// What a verification email asks the recipient to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationTarget<'a> {
    Code(&'a str),
    Link(&'a str),
}

impl VerificationEmailPayload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if is_blank(&self.to) {
            return Err(ValidationError::MissingRecipient);
        }
        if is_blank(&self.username) {
            return Err(ValidationError::MissingUsername);
        }
        if self.target().is_none() {
            return Err(ValidationError::MissingVerificationTarget);
        }
        Ok(())
    }

    /// The code when present, otherwise the verification link.
    pub fn target(&self) -> Option<VerificationTarget<'_>> {
        if !is_blank_opt(self.code.as_deref()) {
            return self.code.as_deref().map(VerificationTarget::Code);
        }
        if !is_blank_opt(self.verify_url.as_deref()) {
            return self.verify_url.as_deref().map(VerificationTarget::Link);
        }
        None
    }
}

/// A user-creation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl UserPayload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if is_blank(&self.id) {
            return Err(ValidationError::MissingUserId);
        }
        if is_blank(&self.email) {
            return Err(ValidationError::MissingUserEmail);
        }
        if is_blank(&self.name) {
            return Err(ValidationError::MissingUserName);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verification(code: Option<&str>, url: Option<&str>) -> VerificationEmailPayload {
        VerificationEmailPayload {
            to: "ana@example.com".into(),
            username: "ana".into(),
            code: code.map(Into::into),
            verify_url: url.map(Into::into),
            token: None,
        }
    }

    #[test]
    fn test_email_validation_order() {
        let mut payload = EmailPayload {
            to: String::new(),
            subject: String::new(),
            body: String::new(),
        };
        assert_eq!(payload.validate(), Err(ValidationError::MissingRecipient));
        payload.to = "a@x.com".into();
        assert_eq!(payload.validate(), Err(ValidationError::MissingSubject));
        payload.subject = "Hi".into();
        assert_eq!(payload.validate(), Err(ValidationError::MissingBody));
        payload.body = "Hello".into();
        assert_eq!(payload.validate(), Ok(()));
    }

    #[test]
    fn test_verification_requires_code_or_url() {
        let payload = verification(None, None);
        assert_eq!(
            payload.validate(),
            Err(ValidationError::MissingVerificationTarget)
        );

        let payload = verification(Some(""), Some("   "));
        assert_eq!(
            payload.validate(),
            Err(ValidationError::MissingVerificationTarget)
        );
    }

    #[test]
    fn test_verification_requires_username() {
        let mut payload = verification(Some("123456"), None);
        payload.username = String::new();
        assert_eq!(payload.validate(), Err(ValidationError::MissingUsername));
    }

    #[test]
    fn test_verification_target_prefers_code() {
        let payload = verification(Some("123456"), Some("https://x.com/v"));
        assert_eq!(payload.target(), Some(VerificationTarget::Code("123456")));

        let payload = verification(Some(""), Some("https://x.com/v"));
        assert_eq!(
            payload.target(),
            Some(VerificationTarget::Link("https://x.com/v"))
        );
    }

    #[test]
    fn test_user_validation() {
        let payload = UserPayload {
            id: "u-1".into(),
            email: "ana@example.com".into(),
            name: String::new(),
            username: None,
        };
        assert_eq!(payload.validate(), Err(ValidationError::MissingUserName));
    }

    #[test]
    fn test_payload_kind_display() {
        assert_eq!(PayloadKind::UserCreated.to_string(), "user_created");
    }
}
