use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{AckDecision, Broker, BrokerError, Message, Subscription, Topic};

#[derive(Default)]
struct SubscriptionState {
    queue: VecDeque<Message>,
    notify: Arc<Notify>,
    acked: Vec<String>,
    nacked: Vec<String>,
    dead_letters: Vec<Message>,
}

#[derive(Default)]
struct State {
    /// Topic name → names of its subscriptions.
    topics: HashMap<String, Vec<String>>,
    subscriptions: HashMap<String, SubscriptionState>,
    published: HashMap<String, Vec<Message>>,
}

/// In-memory broker for tests and local pipelines.
///
/// Topics fan out to their subscriptions; a negatively acknowledged message is
/// put back at the end of its subscription's queue. Every settlement is
/// recorded so tests can assert on acks, nacks and dead letters.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
    max_deliveries: Option<u64>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop redelivering a message once it has been delivered `max` times; it
    /// is moved to the subscription's dead letters instead.
    pub fn with_max_deliveries(mut self, max: u64) -> Self {
        self.max_deliveries = Some(max.max(1));
        self
    }

    /// Ids of the messages acknowledged on `subscription`, in settlement order.
    pub async fn acked(&self, subscription: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .subscriptions
            .get(subscription)
            .map(|s| s.acked.clone())
            .unwrap_or_default()
    }

    /// Ids of the messages negatively acknowledged on `subscription`.
    pub async fn nacked(&self, subscription: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .subscriptions
            .get(subscription)
            .map(|s| s.nacked.clone())
            .unwrap_or_default()
    }

    pub async fn dead_letters(&self, subscription: &str) -> Vec<Message> {
        let state = self.state.lock().await;
        state
            .subscriptions
            .get(subscription)
            .map(|s| s.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Every message ever published to `topic`.
    pub async fn published(&self, topic: &str) -> Vec<Message> {
        let state = self.state.lock().await;
        state.published.get(topic).cloned().unwrap_or_default()
    }

    /// Messages waiting in `subscription`'s queue.
    pub async fn pending(&self, subscription: &str) -> usize {
        let state = self.state.lock().await;
        state
            .subscriptions
            .get(subscription)
            .map_or(0, |s| s.queue.len())
    }

    async fn pop(&self, subscription: &str) -> Option<Message> {
        let mut state = self.state.lock().await;
        state.subscriptions.get_mut(subscription)?.queue.pop_front()
    }

    async fn settle(&self, subscription: &str, mut message: Message, decision: AckDecision) {
        let mut state = self.state.lock().await;
        let Some(sub) = state.subscriptions.get_mut(subscription) else {
            return;
        };

        match decision {
            AckDecision::Ack => sub.acked.push(message.id),
            AckDecision::Nack => {
                sub.nacked.push(message.id.clone());
                if self
                    .max_deliveries
                    .is_some_and(|max| message.delivery_attempt >= max)
                {
                    tracing::warn!(
                        subscription,
                        message_id = %message.id,
                        deliveries = message.delivery_attempt,
                        "Message exceeded max deliveries, dead-lettering"
                    );
                    sub.dead_letters.push(message);
                } else {
                    message.delivery_attempt += 1;
                    sub.queue.push_back(message);
                    sub.notify.notify_one();
                }
            }
        }
    }
}

impl Broker for InMemoryBroker {
    async fn ensure_topic(&self, name: &str) -> Result<Topic, BrokerError> {
        let mut state = self.state.lock().await;
        if !state.topics.contains_key(name) {
            state.topics.insert(name.to_string(), Vec::new());
            tracing::info!(topic = name, "Created topic");
        }
        Ok(Topic::new(name))
    }

    async fn ensure_subscription(
        &self,
        name: &str,
        topic: &Topic,
    ) -> Result<Subscription, BrokerError> {
        let mut state = self.state.lock().await;
        let subscribers = state
            .topics
            .get_mut(topic.name())
            .ok_or_else(|| BrokerError::UnknownTopic(topic.name().to_string()))?;

        if !subscribers.iter().any(|s| s == name) {
            subscribers.push(name.to_string());
            state
                .subscriptions
                .insert(name.to_string(), SubscriptionState::default());
            tracing::info!(subscription = name, topic = topic.name(), "Created subscription");
        }

        Ok(Subscription::new(name, topic))
    }

    async fn publish(&self, topic: &Topic, data: Vec<u8>) -> Result<String, BrokerError> {
        let mut state = self.state.lock().await;
        let subscribers = state
            .topics
            .get(topic.name())
            .cloned()
            .ok_or_else(|| BrokerError::UnknownTopic(topic.name().to_string()))?;

        let message = Message {
            id: Uuid::new_v4().to_string(),
            data,
            delivery_attempt: 1,
        };

        for name in &subscribers {
            if let Some(sub) = state.subscriptions.get_mut(name) {
                sub.queue.push_back(message.clone());
                sub.notify.notify_one();
            }
        }

        let id = message.id.clone();
        state
            .published
            .entry(topic.name().to_string())
            .or_default()
            .push(message);

        Ok(id)
    }

    async fn receive<H, Fut>(
        &self,
        subscription: &Subscription,
        cancel: CancellationToken,
        handler: H,
    ) -> Result<(), BrokerError>
    where
        H: Fn(Message) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = AckDecision> + Send + 'static,
    {
        let notify = {
            let state = self.state.lock().await;
            state
                .subscriptions
                .get(subscription.name())
                .map(|s| Arc::clone(&s.notify))
                .ok_or_else(|| BrokerError::UnknownSubscription(subscription.name().to_string()))?
        };

        let mut in_flight = JoinSet::new();

        loop {
            while let Some(message) = self.pop(subscription.name()).await {
                let broker = self.clone();
                let handler = handler.clone();
                let name = subscription.name().to_string();
                in_flight.spawn(async move {
                    let decision = handler(message.clone()).await;
                    broker.settle(&name, message, decision).await;
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = notify.notified() => {}
                Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Message handler task failed");
                    }
                }
            }
        }

        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Message handler task failed");
            }
        }

        Ok(())
    }
}
