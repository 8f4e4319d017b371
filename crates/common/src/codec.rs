//! Payload codec: JSON bytes to typed payload records and back.
//!
//! Field validation belongs to the publishing side ([`Payload::check`]);
//! decoding only checks that the bytes have the payload's shape.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::types::{EmailPayload, PayloadKind, UserPayload, ValidationError, VerificationEmailPayload};

/// Why raw message bytes could not become a payload. Never retriable.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed {kind} payload: {source}")]
    Malformed {
        kind: PayloadKind,
        #[source]
        source: serde_json::Error,
    },
}

/// A record that travels through the broker as JSON.
pub trait Payload: Serialize + DeserializeOwned + Send + 'static {
    const KIND: PayloadKind;

    /// Required-field checks, run before a payload is published.
    fn check(&self) -> Result<(), ValidationError>;

    fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse received bytes. Fields are not re-validated.
    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(bytes).map_err(|source| DecodeError::Malformed {
            kind: Self::KIND,
            source,
        })
    }
}

impl Payload for EmailPayload {
    const KIND: PayloadKind = PayloadKind::Email;

    fn check(&self) -> Result<(), ValidationError> {
        self.validate()
    }
}

impl Payload for VerificationEmailPayload {
    const KIND: PayloadKind = PayloadKind::Verification;

    fn check(&self) -> Result<(), ValidationError> {
        self.validate()
    }
}

impl Payload for UserPayload {
    const KIND: PayloadKind = PayloadKind::UserCreated;

    fn check(&self) -> Result<(), ValidationError> {
        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_decode_encode_identity() {
        let payload = EmailPayload {
            to: "a@x.com".into(),
            subject: "Bem-vindo".into(),
            body: "Olá,\nseja bem-vindo!".into(),
        };
        let bytes = payload.encode().unwrap();
        assert_eq!(EmailPayload::decode(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_decode_wire_format() {
        let bytes = br#"{"to":"a@x.com","subject":"Hi","body":"Hello"}"#;
        let payload = EmailPayload::decode(bytes).unwrap();
        assert_eq!(payload.to, "a@x.com");
        assert_eq!(payload.subject, "Hi");
        assert_eq!(payload.body, "Hello");
    }

    #[test]
    fn test_malformed_bytes() {
        let cases: [&[u8]; 5] = [b"not json", b"", b"[1,2,3]", br#"{"to": 42}"#, b"\xff\xfe"];
        for bytes in cases {
            let err = EmailPayload::decode(bytes).unwrap_err();
            assert!(matches!(err, DecodeError::Malformed { kind: PayloadKind::Email, .. }));
        }
    }

    #[test]
    fn test_missing_fields_decode_but_fail_check() {
        let payload = EmailPayload::decode(br#"{"to":"a@x.com","subject":"Hi"}"#).unwrap();
        assert_eq!(payload.body, "");
        assert_eq!(payload.check(), Err(ValidationError::MissingBody));
    }

    #[test]
    fn test_verification_without_code_or_url_decodes() {
        let payload = VerificationEmailPayload::decode(br#"{"to":"a@x.com","username":"ana"}"#)
            .unwrap();
        assert!(payload.target().is_none());
        assert_eq!(
            payload.check(),
            Err(ValidationError::MissingVerificationTarget)
        );
    }

    #[test]
    fn test_verification_legacy_token_round_trips() {
        let bytes = br#"{"to":"a@x.com","username":"ana","verify_url":"https://x.com/v?t=1","token":"abc"}"#;
        let payload = VerificationEmailPayload::decode(bytes).unwrap();
        assert_eq!(payload.token.as_deref(), Some("abc"));
        assert_eq!(VerificationEmailPayload::decode(&payload.encode().unwrap()).unwrap(), payload);
    }

    #[test]
    fn test_user_payload_optional_username_omitted() {
        let payload = UserPayload {
            id: "u-1".into(),
            email: "ana@example.com".into(),
            name: "Ana".into(),
            username: None,
        };
        let json = String::from_utf8(payload.encode().unwrap()).unwrap();
        assert!(!json.contains("username"));
        assert_eq!(UserPayload::decode(json.as_bytes()).unwrap(), payload);
    }
}
