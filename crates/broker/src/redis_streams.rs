//! Redis Streams broker.
//!
//! - A topic is a stream key; a subscription is a consumer group on it.
//! - New messages are read with `XREADGROUP ... >` on a dedicated connection
//!   (reads block, so they must not share the multiplexed command connection).
//! - At most `batch_size` messages are handled at once per receiver; no new
//!   entries are read while that many are in flight.
//! - Ack is `XACK`. Nack leaves the entry in the group's pending list; entries
//!   idle for longer than `redelivery_idle` are reclaimed with `XPENDING` +
//!   `XCLAIM` and delivered again. Entries this receiver is still handling
//!   are never reclaimed.
//! - Entries delivered `max_deliveries` times are copied to
//!   `<topic>.dead-letter` together with their delivery metadata, then acked.
//! - Connection-level failures (I/O, timeouts, a restarting server) are
//!   retried after `reconnect_delay`; any other Redis error ends the receive.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamRangeReply, StreamReadOptions,
    StreamReadReply,
};
use redis::{AsyncCommands, Client, ErrorKind, RedisError};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{AckDecision, Broker, BrokerError, Message, Subscription, Topic};

/// Stream entry field holding the message payload.
const DATA_FIELD: &str = "data";

const DEAD_LETTER_SUFFIX: &str = ".dead-letter";

/// Tuning knobs for stream consumption.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Entries fetched per read, and the cap on messages handled at once.
    pub batch_size: usize,
    /// How long a read waits for new entries before checking for redeliveries.
    pub block: Duration,
    /// Idle time after which an unacknowledged entry is redelivered.
    pub redelivery_idle: Duration,
    /// Deliveries after which an entry is dead-lettered.
    pub max_deliveries: u64,
    /// Pause before retrying after a connection-level failure.
    pub reconnect_delay: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            block: Duration::from_secs(2),
            redelivery_idle: Duration::from_secs(10),
            max_deliveries: 5,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// Name of the stream that receives `topic`'s dead letters.
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{topic}{DEAD_LETTER_SUFFIX}")
}

/// Whether `error` is worth waiting out rather than giving up on.
pub fn is_transient(error: &RedisError) -> bool {
    error.is_io_error()
        || error.is_timeout()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
        || matches!(
            error.kind(),
            ErrorKind::BusyLoadingError
                | ErrorKind::TryAgain
                | ErrorKind::ClusterDown
                | ErrorKind::MasterDown
        )
}

/// Ids of the entries whose handlers are still running.
#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    fn ids(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn contains(&self, id: &str) -> bool {
        self.ids().contains(id)
    }

    fn len(&self) -> usize {
        self.ids().len()
    }

    /// Mark `id` in flight until the returned guard is dropped.
    fn track(&self, id: &str) -> InFlightGuard {
        self.ids().insert(id.to_string());
        InFlightGuard {
            set: self.clone(),
            id: id.to_string(),
        }
    }
}

struct InFlightGuard {
    set: InFlight,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.ids().remove(&self.id);
    }
}

/// Broker backed by Redis Streams consumer groups.
#[derive(Clone)]
pub struct RedisStreamsBroker {
    client: Client,
    conn: ConnectionManager,
    consumer: String,
    options: StreamOptions,
}

impl RedisStreamsBroker {
    pub fn new(client: Client, conn: ConnectionManager, options: StreamOptions) -> Self {
        Self {
            client,
            conn,
            consumer: format!("worker-{}", Uuid::new_v4()),
            options,
        }
    }

    /// Consumer name this process registers in every group it reads.
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Pick up to `limit` entries other deliveries left pending for too long.
    async fn reclaim(
        &self,
        conn: &mut ConnectionManager,
        subscription: &Subscription,
        in_progress: &InFlight,
        limit: usize,
    ) -> Result<Vec<Message>, RedisError> {
        let idle_ms = self.options.redelivery_idle.as_millis() as u64;

        // Our own running entries are listed too; ask for enough to see past them.
        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(subscription.topic())
            .arg(subscription.name())
            .arg("IDLE")
            .arg(idle_ms)
            .arg("-")
            .arg("+")
            .arg(limit + in_progress.len())
            .query_async(conn)
            .await?;

        let mut deliveries = HashMap::new();
        let mut retry_ids = Vec::new();

        for entry in pending.ids {
            if in_progress.contains(&entry.id) {
                continue;
            }
            let times_delivered = entry.times_delivered as u64;
            if times_delivered >= self.options.max_deliveries {
                self.dead_letter(conn, subscription, &entry.id, times_delivered)
                    .await?;
            } else if retry_ids.len() < limit {
                deliveries.insert(entry.id.clone(), times_delivered);
                retry_ids.push(entry.id);
            }
        }

        if retry_ids.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: StreamClaimReply = conn
            .xclaim(
                subscription.topic(),
                subscription.name(),
                &self.consumer,
                idle_ms,
                &retry_ids,
            )
            .await?;

        let mut messages = Vec::with_capacity(claimed.ids.len());
        for entry in &claimed.ids {
            let attempt = deliveries.get(&entry.id).copied().unwrap_or(0) + 1;
            match to_message(entry, attempt) {
                Some(message) => messages.push(message),
                None => ack_without_data(conn, subscription, &entry.id).await,
            }
        }

        if !messages.is_empty() {
            tracing::info!(
                subscription = subscription.name(),
                count = messages.len(),
                "Reclaimed pending messages for redelivery"
            );
        }

        Ok(messages)
    }

    async fn dead_letter(
        &self,
        conn: &mut ConnectionManager,
        subscription: &Subscription,
        id: &str,
        times_delivered: u64,
    ) -> Result<(), RedisError> {
        let range: StreamRangeReply = conn.xrange(subscription.topic(), id, id).await?;
        let data = range
            .ids
            .first()
            .and_then(|entry| entry.get::<Vec<u8>>(DATA_FIELD))
            .unwrap_or_default();

        let dead_letter_stream = dead_letter_topic(subscription.topic());
        let deliveries = times_delivered.to_string();
        let failed_at = chrono::Utc::now().to_rfc3339();

        let _: String = conn
            .xadd(
                &dead_letter_stream,
                "*",
                &[
                    (DATA_FIELD, data.as_slice()),
                    ("original_id", id.as_bytes()),
                    ("subscription", subscription.name().as_bytes()),
                    ("deliveries", deliveries.as_bytes()),
                    ("failed_at", failed_at.as_bytes()),
                ],
            )
            .await?;
        let _: i64 = conn
            .xack(subscription.topic(), subscription.name(), &[id])
            .await?;

        tracing::warn!(
            subscription = subscription.name(),
            message_id = id,
            deliveries = times_delivered,
            dead_letter_stream = %dead_letter_stream,
            "Message exceeded max deliveries, moved to dead-letter stream"
        );

        Ok(())
    }

    /// Log a recoverable error and wait before the next try.
    ///
    /// Returns `true` when `cancel` fired during the wait.
    async fn back_off(
        &self,
        subscription: &Subscription,
        error: &RedisError,
        cancel: &CancellationToken,
    ) -> bool {
        tracing::warn!(
            subscription = subscription.name(),
            error = %error,
            retry_in_ms = self.options.reconnect_delay.as_millis() as u64,
            "Redis unavailable, retrying"
        );
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(self.options.reconnect_delay) => false,
        }
    }
}

fn to_message(entry: &StreamId, delivery_attempt: u64) -> Option<Message> {
    entry.get::<Vec<u8>>(DATA_FIELD).map(|data| Message {
        id: entry.id.clone(),
        data,
        delivery_attempt,
    })
}

/// Entries without a payload field can never be processed; drop them.
async fn ack_without_data(conn: &mut ConnectionManager, subscription: &Subscription, id: &str) {
    tracing::warn!(
        subscription = subscription.name(),
        message_id = id,
        "Stream entry has no `data` field, acknowledging and skipping"
    );
    let result: Result<i64, RedisError> = conn
        .xack(subscription.topic(), subscription.name(), &[id])
        .await;
    if let Err(e) = result {
        tracing::error!(message_id = id, error = %e, "Failed to acknowledge stream entry");
    }
}

async fn settle(
    mut conn: ConnectionManager,
    subscription: Subscription,
    id: String,
    decision: AckDecision,
) {
    match decision {
        AckDecision::Ack => {
            let result: Result<i64, RedisError> = conn
                .xack(subscription.topic(), subscription.name(), &[&id])
                .await;
            if let Err(e) = result {
                // The entry stays pending and will be redelivered.
                tracing::error!(
                    subscription = subscription.name(),
                    message_id = %id,
                    error = %e,
                    "Failed to acknowledge message"
                );
            }
        }
        AckDecision::Nack => {
            tracing::debug!(
                subscription = subscription.name(),
                message_id = %id,
                "Message left pending for redelivery"
            );
        }
    }
}

fn spawn_handler<H, Fut>(
    in_flight: &mut JoinSet<()>,
    tracker: &InFlight,
    conn: &ConnectionManager,
    subscription: &Subscription,
    handler: &H,
    message: Message,
) where
    H: Fn(Message) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = AckDecision> + Send + 'static,
{
    // Tracked before the task starts so the next reclaim pass already skips it.
    let guard = tracker.track(&message.id);
    let handler = handler.clone();
    let conn = conn.clone();
    let subscription = subscription.clone();
    in_flight.spawn(async move {
        let _guard = guard;
        let id = message.id.clone();
        let decision = handler(message).await;
        settle(conn, subscription, id, decision).await;
    });
}

fn log_task_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Message handler task failed");
    }
}

impl Broker for RedisStreamsBroker {
    async fn ensure_topic(&self, name: &str) -> Result<Topic, BrokerError> {
        let mut conn = self.conn.clone();
        let kind: String = redis::cmd("TYPE").arg(name).query_async(&mut conn).await?;

        match kind.as_str() {
            "stream" => {}
            "none" => {
                // An empty stream: add one entry and trim it away.
                let _: String = redis::cmd("XADD")
                    .arg(name)
                    .arg("MAXLEN")
                    .arg(0)
                    .arg("*")
                    .arg("created")
                    .arg(1)
                    .query_async(&mut conn)
                    .await?;
                tracing::info!(topic = name, "Created topic");
            }
            other => {
                return Err(BrokerError::NotAStream {
                    key: name.to_string(),
                    found: other.to_string(),
                });
            }
        }

        Ok(Topic::new(name))
    }

    async fn ensure_subscription(
        &self,
        name: &str,
        topic: &Topic,
    ) -> Result<Subscription, BrokerError> {
        let mut conn = self.conn.clone();
        let result: Result<(), RedisError> = conn
            .xgroup_create_mkstream(topic.name(), name, "$")
            .await;

        match result {
            Ok(()) => {
                tracing::info!(subscription = name, topic = topic.name(), "Created subscription");
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                tracing::debug!(subscription = name, "Subscription already exists");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Subscription::new(name, topic))
    }

    async fn publish(&self, topic: &Topic, data: Vec<u8>) -> Result<String, BrokerError> {
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(topic.name(), "*", &[(DATA_FIELD, data.as_slice())])
            .await?;

        tracing::debug!(topic = topic.name(), message_id = %id, "Published message");
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
        let mut conn = self.conn.clone();
        let mut reader: Option<MultiplexedConnection> = None;
        let batch_size = self.options.batch_size.max(1);
        let block_ms = self.options.block.as_millis() as usize;

        let keys = [subscription.topic()];
        let new_entries = [">"];

        let tracker = InFlight::default();
        let mut in_flight = JoinSet::new();
        let mut last_reclaim = Instant::now();

        tracing::info!(
            subscription = subscription.name(),
            topic = subscription.topic(),
            consumer = %self.consumer,
            "Receiving from stream"
        );

        let outcome: Result<(), BrokerError> = loop {
            while let Some(result) = in_flight.try_join_next() {
                log_task_result(result);
            }

            if in_flight.len() >= batch_size {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break Ok(()),
                    Some(result) = in_flight.join_next() => log_task_result(result),
                }
                continue;
            }
            let mut capacity = batch_size - in_flight.len();

            if last_reclaim.elapsed() >= self.options.redelivery_idle {
                match self.reclaim(&mut conn, subscription, &tracker, capacity).await {
                    Ok(messages) => {
                        capacity -= messages.len();
                        for message in messages {
                            spawn_handler(&mut in_flight, &tracker, &conn, subscription, &handler, message);
                        }
                        last_reclaim = Instant::now();
                    }
                    Err(e) if is_transient(&e) => {
                        if self.back_off(subscription, &e, &cancel).await {
                            break Ok(());
                        }
                        continue;
                    }
                    Err(e) => break Err(e.into()),
                }
            }

            if capacity == 0 {
                continue;
            }

            if reader.is_none() {
                match self.client.get_multiplexed_async_connection().await {
                    Ok(connection) => reader = Some(connection),
                    Err(e) if is_transient(&e) => {
                        if self.back_off(subscription, &e, &cancel).await {
                            break Ok(());
                        }
                        continue;
                    }
                    Err(e) => break Err(e.into()),
                }
            }
            let Some(reader_conn) = reader.as_mut() else {
                continue;
            };

            let read_options = StreamReadOptions::default()
                .group(subscription.name(), &self.consumer)
                .count(capacity)
                .block(block_ms);

            let reply: Result<Option<StreamReadReply>, RedisError> = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                reply = reader_conn.xread_options(&keys, &new_entries, &read_options) => reply,
            };

            match reply {
                Ok(reply) => {
                    for key in reply.map(|r| r.keys).unwrap_or_default() {
                        for entry in &key.ids {
                            match to_message(entry, 1) {
                                Some(message) => spawn_handler(
                                    &mut in_flight,
                                    &tracker,
                                    &conn,
                                    subscription,
                                    &handler,
                                    message,
                                ),
                                None => ack_without_data(&mut conn, subscription, &entry.id).await,
                            }
                        }
                    }
                }
                Err(e) if is_transient(&e) => {
                    reader = None;
                    if self.back_off(subscription, &e, &cancel).await {
                        break Ok(());
                    }
                }
                Err(e) => break Err(e.into()),
            }
        };

        tracing::info!(
            subscription = subscription.name(),
            in_flight = in_flight.len(),
            "Receiver stopping, waiting for in-flight messages"
        );
        while let Some(result) = in_flight.join_next().await {
            log_task_result(result);
        }

        outcome
    }
}
