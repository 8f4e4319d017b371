//! Publish/subscribe broker abstraction.
//!
//! A [`Topic`] fans out to any number of [`Subscription`]s, each consumed
//! independently. Consumers hand every [`Message`] to a handler that answers
//! with an [`AckDecision`]: acknowledged messages leave the subscription,
//! negatively acknowledged ones become available for redelivery.
//!
//! Two implementations are provided:
//! - [`RedisStreamsBroker`]: topics are Redis streams, subscriptions are
//!   consumer groups.
//! - [`InMemoryBroker`]: process-local queues for tests and local runs.

pub mod memory;
pub mod redis_streams;

use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use memory::InMemoryBroker;
pub use redis_streams::{RedisStreamsBroker, StreamOptions};

/// A named channel messages are published to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    name: String,
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A named, independently consumed view of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    name: String,
    topic: String,
}

impl Subscription {
    pub fn new(name: impl Into<String>, topic: &Topic) -> Self {
        Self {
            name: name.into(),
            topic: topic.name.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// A message as delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Broker-assigned identity.
    pub id: String,
    /// Opaque payload bytes.
    pub data: Vec<u8>,
    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_attempt: u64,
}

/// The outcome a handler reports for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Processed; remove the message.
    Ack,
    /// Not processed; make the message available for redelivery.
    Nack,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("key `{key}` exists but holds a {found}, not a stream")]
    NotAStream { key: String, found: String },

    #[error("unknown topic `{0}`")]
    UnknownTopic(String),

    #[error("unknown subscription `{0}`")]
    UnknownSubscription(String),
}

/// Operations the worker and the API need from a publish/subscribe broker.
pub trait Broker: Send + Sync + 'static {
    /// Return the topic, creating it when absent.
    fn ensure_topic(&self, name: &str) -> impl Future<Output = Result<Topic, BrokerError>> + Send;

    /// Return the subscription on `topic`, creating it when absent.
    fn ensure_subscription(
        &self,
        name: &str,
        topic: &Topic,
    ) -> impl Future<Output = Result<Subscription, BrokerError>> + Send;

    /// Publish raw bytes and return the broker-assigned message id.
    fn publish(
        &self,
        topic: &Topic,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<String, BrokerError>> + Send;

    /// Deliver messages from `subscription` to `handler` until `cancel` fires.
    ///
    /// Messages may be handled concurrently. Each message is settled with the
    /// decision its handler returned. On cancellation no new messages are
    /// fetched, in-flight handlers run to completion and are settled, then the
    /// call returns `Ok(())`. An error means the receiver cannot continue.
    fn receive<H, Fut>(
        &self,
        subscription: &Subscription,
        cancel: CancellationToken,
        handler: H,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send
    where
        H: Fn(Message) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = AckDecision> + Send + 'static;
}
