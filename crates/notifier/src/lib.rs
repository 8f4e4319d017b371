//! Notification workers: turn broker messages into delivered emails.
//!
//! - [`retry`]: bounded, constant-delay retry of a fallible operation
//! - [`delivery`] / [`resend`]: the outbound email seam and its Resend client
//! - [`templates`]: HTML bodies per email kind
//! - [`handlers`]: one handler per payload kind
//! - [`pump`]: per-subscription receive loop deciding ack / nack

pub mod delivery;
pub mod handlers;
pub mod pump;
pub mod resend;
pub mod retry;
pub mod templates;

#[cfg(test)]
pub(crate) mod fake;
