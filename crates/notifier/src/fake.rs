use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::delivery::{DeliveryError, Mailer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SentEmail {
    pub to: String,
    pub subject: String,
    pub content: String,
    pub html: bool,
}

/// Mailer that records successful sends and fails a configurable number of
/// attempts first.
#[derive(Default)]
pub(crate) struct RecordingMailer {
    sent: Mutex<Vec<SentEmail>>,
    failures_left: AtomicU32,
    attempts: AtomicU32,
}

impl RecordingMailer {
    pub fn failing(times: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(times),
            ..Self::default()
        }
    }

    pub fn always_failing() -> Self {
        Self::failing(u32::MAX)
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn record(&self, to: &str, subject: &str, content: &str, html: bool) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DeliveryError::Rejected {
                status: 503,
                detail: "unavailable".into(),
            });
        }
        self.sent.lock().unwrap().push(SentEmail {
            to: to.into(),
            subject: subject.into(),
            content: content.into(),
            html,
        });
        Ok(())
    }
}

impl Mailer for RecordingMailer {
    async fn send_plain_text(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        self.record(to, subject, body, false)
    }

    async fn send_html(&self, to: &str, subject: &str, html: &str) -> Result<(), DeliveryError> {
        self.record(to, subject, html, true)
    }
}
