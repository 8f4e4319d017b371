//! Shared building blocks for the NorthFi mail worker and API.

pub mod codec;
pub mod config;
pub mod error;
pub mod redis_pool;
pub mod types;
