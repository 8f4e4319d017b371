//! HTTP API that validates email requests and publishes them to the broker.
//!
//! - `GET  /health`
//! - `POST /send-email` → email topic
//! - `POST /send-verification-email` → verification topic
//! - `POST /create-user` → user creation topic

pub mod routes;
pub mod state;
