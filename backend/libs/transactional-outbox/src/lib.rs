//! # Transactional Outbox
//!
//! Domain events are written to an `outbox_events` table in the same
//! transaction as the state change that caused them. A background
//! [`OutboxProcessor`] relays unpublished rows to the event bus and marks them
//! published only after the broker accepted them.
//!
//! This gives at-least-once delivery: a crash between publish and
//! `mark_published` republishes the row, so consumers must be idempotent.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use transactional_outbox::{OutboxEvent, SqlxOutboxRepository};
//! use event_schema::{topics, UserRegisteredEvent};
//! use sqlx::PgPool;
//! use uuid::Uuid;
//!
//! async fn register(pool: &PgPool, outbox: &SqlxOutboxRepository) -> anyhow::Result<()> {
//!     let account_id = Uuid::new_v4();
//!     let mut tx = pool.begin().await?;
//!
//!     sqlx::query("INSERT INTO accounts (id, full_name) VALUES ($1, $2)")
//!         .bind(account_id)
//!         .bind("Alice")
//!         .execute(&mut *tx)
//!         .await?;
//!
//!     let envelope = UserRegisteredEvent { account_id, full_name: "Alice".into() }
//!         .envelope("auth-service");
//!     let event = OutboxEvent::from_envelope(topics::AUTH_USER_EVENT, account_id, &envelope)?;
//!     outbox.insert(&mut tx, &event).await?;
//!
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_bus::{EventPublisher, OutgoingEvent};
use event_schema::EventEnvelope;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

mod error;

pub use error::{OutboxError, OutboxResult};

/// An event row waiting to be relayed to the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Same value as the envelope's `event_id`
    pub id: Uuid,

    pub topic: String,

    /// Partition key on the bus
    pub aggregate_id: Uuid,

    pub event_type: String,

    /// Serialized envelope
    pub payload: serde_json::Value,

    pub created_at: DateTime<Utc>,

    /// None until the broker accepted the event
    pub published_at: Option<DateTime<Utc>>,

    pub retry_count: i32,

    pub last_error: Option<String>,

    /// Earliest time of the next publish attempt; None means due now
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn from_envelope<T: Serialize>(
        topic: &str,
        aggregate_id: Uuid,
        envelope: &EventEnvelope<T>,
    ) -> OutboxResult<Self> {
        Ok(Self {
            id: envelope.event_id,
            topic: topic.to_string(),
            aggregate_id,
            event_type: envelope.event_type.clone(),
            payload: serde_json::to_value(envelope)?,
            created_at: envelope.timestamp,
            published_at: None,
            retry_count: 0,
            last_error: None,
            next_attempt_at: None,
        })
    }

    fn to_outgoing(&self) -> OutboxResult<OutgoingEvent> {
        let payload = serde_json::to_vec(&self.payload)?;
        let correlation_id = self
            .payload
            .get("correlation_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string());

        Ok(
            OutgoingEvent::new(self.topic.clone(), self.aggregate_id.to_string(), payload)
                .with_header("event_type", self.event_type.clone())
                .with_header("event_id", self.id.to_string())
                .with_header("correlation_id", correlation_id),
        )
    }
}

/// Read side of the outbox used by the relay.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Oldest publishable events first.
    ///
    /// An event is publishable when it is unpublished, has fewer than
    /// `max_retries` failed attempts, is due, and no older unpublished event
    /// of its aggregate is parked or waiting for its retry.
    async fn get_unpublished(&self, limit: i64, max_retries: i32) -> OutboxResult<Vec<OutboxEvent>>;

    async fn mark_published(&self, event_id: Uuid) -> OutboxResult<()>;

    /// Increments the retry count, records the error and schedules the next attempt.
    async fn mark_failed(
        &self,
        event_id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> OutboxResult<()>;
}

#[async_trait]
impl<S: OutboxStore + ?Sized> OutboxStore for Arc<S> {
    async fn get_unpublished(&self, limit: i64, max_retries: i32) -> OutboxResult<Vec<OutboxEvent>> {
        (**self).get_unpublished(limit, max_retries).await
    }

    async fn mark_published(&self, event_id: Uuid) -> OutboxResult<()> {
        (**self).mark_published(event_id).await
    }

    async fn mark_failed(
        &self,
        event_id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> OutboxResult<()> {
        (**self).mark_failed(event_id, error, next_attempt_at).await
    }
}

/// PostgreSQL outbox backed by the `outbox_events` table.
#[derive(Clone)]
pub struct SqlxOutboxRepository {
    pool: PgPool,
}

impl SqlxOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts an event inside the caller's transaction.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &OutboxEvent,
    ) -> OutboxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (
                id,
                topic,
                aggregate_id,
                event_type,
                payload,
                created_at,
                published_at,
                retry_count,
                last_error,
                next_attempt_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.id)
        .bind(&event.topic)
        .bind(event.aggregate_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.created_at)
        .bind(event.published_at)
        .bind(event.retry_count)
        .bind(&event.last_error)
        .bind(event.next_attempt_at)
        .execute(&mut **tx)
        .await
        .context("Failed to insert event into outbox")?;

        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            "Event inserted into outbox"
        );

        Ok(())
    }

    pub async fn pending_count(&self) -> OutboxResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*)::BIGINT AS pending FROM outbox_events WHERE published_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count pending events")?;

        Ok(row.try_get("pending")?)
    }
}

#[async_trait]
impl OutboxStore for SqlxOutboxRepository {
    async fn get_unpublished(&self, limit: i64, max_retries: i32) -> OutboxResult<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT
                e.id,
                e.topic,
                e.aggregate_id,
                e.event_type,
                e.payload,
                e.created_at,
                e.published_at,
                e.retry_count,
                e.last_error,
                e.next_attempt_at
            FROM outbox_events e
            WHERE e.published_at IS NULL
              AND e.retry_count < $2
              AND (e.next_attempt_at IS NULL OR e.next_attempt_at <= NOW())
              AND NOT EXISTS (
                  SELECT 1
                  FROM outbox_events b
                  WHERE b.aggregate_id = e.aggregate_id
                    AND b.published_at IS NULL
                    AND (b.created_at, b.id) < (e.created_at, e.id)
                    AND (b.retry_count >= $2 OR b.next_attempt_at > NOW())
              )
            ORDER BY e.created_at ASC, e.id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .bind(max_retries)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch unpublished events")?;

        let events = rows
            .into_iter()
            .map(|row| {
                Ok(OutboxEvent {
                    id: row.try_get("id")?,
                    topic: row.try_get("topic")?,
                    aggregate_id: row.try_get("aggregate_id")?,
                    event_type: row.try_get("event_type")?,
                    payload: row.try_get("payload")?,
                    created_at: row.try_get("created_at")?,
                    published_at: row.try_get("published_at")?,
                    retry_count: row.try_get("retry_count")?,
                    last_error: row.try_get("last_error")?,
                    next_attempt_at: row.try_get("next_attempt_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .context("Failed to parse events")?;

        debug!(count = events.len(), "Fetched unpublished events");

        Ok(events)
    }

    async fn mark_published(&self, event_id: Uuid) -> OutboxResult<()> {
        let result = sqlx::query("UPDATE outbox_events SET published_at = NOW() WHERE id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await
            .context("Failed to mark event as published")?;

        if result.rows_affected() == 0 {
            warn!(event_id = %event_id, "Event not found when marking as published");
            return Err(OutboxError::EventNotFound(event_id));
        }

        Ok(())
    }

    async fn mark_failed(
        &self,
        event_id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> OutboxResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET
                retry_count = retry_count + 1,
                last_error = $2,
                next_attempt_at = $3
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .bind(error)
        .bind(next_attempt_at)
        .execute(&self.pool)
        .await
        .context("Failed to mark event as failed")?;

        if result.rows_affected() == 0 {
            warn!(event_id = %event_id, "Event not found when marking as failed");
            return Err(OutboxError::EventNotFound(event_id));
        }

        Ok(())
    }
}

/// Process-local outbox for tests and the in-process cluster.
#[derive(Clone, Default)]
pub struct MemoryOutbox {
    events: Arc<Mutex<Vec<OutboxEvent>>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, event: OutboxEvent) {
        self.events.lock().await.push(event);
    }

    pub async fn all(&self) -> Vec<OutboxEvent> {
        self.events.lock().await.clone()
    }

    pub async fn pending(&self) -> Vec<OutboxEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.published_at.is_none())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutbox {
    async fn get_unpublished(&self, limit: i64, max_retries: i32) -> OutboxResult<Vec<OutboxEvent>> {
        let events = self.events.lock().await;
        let now = Utc::now();
        let mut held: HashSet<Uuid> = HashSet::new();
        let mut ready = Vec::new();

        // insertion order is creation order
        for event in events.iter().filter(|e| e.published_at.is_none()) {
            if ready.len() >= usize::try_from(limit).unwrap_or(0) {
                break;
            }
            if held.contains(&event.aggregate_id) {
                continue;
            }
            let parked = event.retry_count >= max_retries;
            let waiting = event.next_attempt_at.map_or(false, |at| at > now);
            if parked || waiting {
                held.insert(event.aggregate_id);
                continue;
            }
            ready.push(event.clone());
        }
        Ok(ready)
    }

    async fn mark_published(&self, event_id: Uuid) -> OutboxResult<()> {
        let mut events = self.events.lock().await;
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or(OutboxError::EventNotFound(event_id))?;
        event.published_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_failed(
        &self,
        event_id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> OutboxResult<()> {
        let mut events = self.events.lock().await;
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or(OutboxError::EventNotFound(event_id))?;
        event.retry_count += 1;
        event.last_error = Some(error.to_string());
        event.next_attempt_at = Some(next_attempt_at);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub batch_size: i64,
    pub poll_interval: Duration,
    /// Attempts after which an event is parked for manual intervention
    pub max_retries: i32,
    /// Unit of the exponential backoff
    pub retry_base: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_millis(500),
            max_retries: 10,
            retry_base: Duration::from_secs(1),
        }
    }
}

impl OutboxConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_parse("OUTBOX_BATCH_SIZE").unwrap_or(defaults.batch_size),
            poll_interval: env_parse("OUTBOX_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            max_retries: env_parse("OUTBOX_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_base: defaults.retry_base,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Background relay from an [`OutboxStore`] to an [`EventPublisher`].
///
/// Events are attempted oldest first. A failed event is rescheduled with an
/// exponential backoff instead of being waited on, and the rest of its
/// aggregate is held back until it goes through, so per-key order on the bus
/// matches commit order. Events past `max_retries` stay parked and keep
/// holding back their aggregate.
pub struct OutboxProcessor<S: OutboxStore + ?Sized, P: EventPublisher + ?Sized> {
    store: Arc<S>,
    publisher: Arc<P>,
    config: OutboxConfig,
}

impl<S: OutboxStore + ?Sized, P: EventPublisher + ?Sized> OutboxProcessor<S, P> {
    pub fn new(store: Arc<S>, publisher: Arc<P>, config: OutboxConfig) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Polls until `shutdown` resolves.
    pub async fn start<F: Future<Output = ()>>(&self, shutdown: F) {
        info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_retries = self.config.max_retries,
            "Outbox processor starting"
        );
        tokio::pin!(shutdown);

        loop {
            match self.process_batch().await {
                Ok(count) if count > 0 => info!(published_count = count, "Published events from outbox"),
                Ok(_) => debug!("No events to publish"),
                Err(e) => error!(error = ?e, "Outbox processor error"),
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("Outbox processor stopped");
    }

    /// Runs one pass and returns the number of events published.
    pub async fn process_batch(&self) -> OutboxResult<usize> {
        let events = self
            .store
            .get_unpublished(self.config.batch_size, self.config.max_retries)
            .await?;
        let mut blocked: HashSet<Uuid> = HashSet::new();
        let mut published_count = 0;

        for event in events {
            if blocked.contains(&event.aggregate_id) {
                continue;
            }

            let outcome = match event.to_outgoing() {
                Ok(outgoing) => self.publisher.publish(outgoing).await.map_err(OutboxError::from),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    if let Err(e) = self.store.mark_published(event.id).await {
                        // The broker has it; the relay will send it again.
                        error!(
                            event_id = %event.id,
                            error = ?e,
                            "Failed to mark event as published"
                        );
                        blocked.insert(event.aggregate_id);
                    } else {
                        published_count += 1;
                    }
                }
                Err(e) => {
                    let attempts = event.retry_count + 1;
                    let backoff = self.calculate_backoff(attempts);
                    if attempts >= self.config.max_retries {
                        warn!(
                            event_id = %event.id,
                            event_type = %event.event_type,
                            retry_count = attempts,
                            error = ?e,
                            "Event exceeded max retries, parked (requires manual intervention)"
                        );
                    } else {
                        error!(
                            event_id = %event.id,
                            event_type = %event.event_type,
                            retry_count = attempts,
                            backoff_ms = backoff.as_millis() as u64,
                            error = ?e,
                            "Failed to publish event"
                        );
                    }
                    blocked.insert(event.aggregate_id);

                    let next_attempt_at = Utc::now()
                        + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::seconds(300));
                    if let Err(mark_err) = self.store.mark_failed(event.id, &e.to_string(), next_attempt_at).await {
                        error!(
                            event_id = %event.id,
                            error = ?mark_err,
                            "Failed to mark event as failed"
                        );
                    }
                }
            }
        }

        Ok(published_count)
    }

    /// Publishes until a pass makes no progress.
    pub async fn drain(&self) -> OutboxResult<usize> {
        let mut total = 0;
        loop {
            let published = self.process_batch().await?;
            if published == 0 {
                return Ok(total);
            }
            total += published;
        }
    }

    /// Delay before attempt number `retry_count + 1`: zero for a first
    /// attempt, then `2^retry_count` units capped at 300.
    fn calculate_backoff(&self, retry_count: i32) -> Duration {
        const MAX_BACKOFF_UNITS: u32 = 300;

        if retry_count <= 0 {
            return Duration::ZERO;
        }
        let units = 2u32
            .checked_pow(retry_count as u32)
            .unwrap_or(MAX_BACKOFF_UNITS)
            .min(MAX_BACKOFF_UNITS);
        self.config.retry_base * units
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::{BusError, BusResult, InMemoryBroker};
    use event_schema::{topics, ProfileUpdatedEvent};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Failed events become due again immediately.
    fn test_config() -> OutboxConfig {
        OutboxConfig {
            retry_base: Duration::ZERO,
            ..OutboxConfig::default()
        }
    }

    fn profile_event(account_id: Uuid, full_name: &str) -> OutboxEvent {
        let envelope = ProfileUpdatedEvent {
            account_id,
            nick_name: None,
            full_name: full_name.to_string(),
            profile_pic: None,
        }
        .envelope("profile-service");
        OutboxEvent::from_envelope(topics::PROFILE_USER_EVENT, account_id, &envelope).unwrap()
    }

    /// Rejects everything for one aggregate while `down` is set.
    struct FlakyPublisher {
        inner: InMemoryBroker,
        failing_key: String,
        down: AtomicBool,
    }

    #[async_trait]
    impl EventPublisher for FlakyPublisher {
        async fn publish(&self, event: OutgoingEvent) -> BusResult<()> {
            if self.down.load(Ordering::SeqCst) && event.key == self.failing_key {
                return Err(BusError::Publish("broker unavailable".into()));
            }
            self.inner.publish(event).await
        }
    }

    #[test]
    fn test_backoff_calculation() {
        let processor = OutboxProcessor::new(
            Arc::new(MemoryOutbox::new()),
            Arc::new(InMemoryBroker::new(1)),
            OutboxConfig::default(),
        );

        assert_eq!(processor.calculate_backoff(0).as_secs(), 0);
        assert_eq!(processor.calculate_backoff(1).as_secs(), 2);
        assert_eq!(processor.calculate_backoff(2).as_secs(), 4);
        assert_eq!(processor.calculate_backoff(5).as_secs(), 32);
        assert_eq!(processor.calculate_backoff(10).as_secs(), 300);
        assert_eq!(processor.calculate_backoff(40).as_secs(), 300);
    }

    #[tokio::test]
    async fn relays_envelope_keyed_by_aggregate() {
        let outbox = Arc::new(MemoryOutbox::new());
        let broker = Arc::new(InMemoryBroker::new(4));
        let account_id = Uuid::new_v4();
        let event = profile_event(account_id, "Alice");
        outbox.push(event.clone()).await;

        let processor = OutboxProcessor::new(outbox.clone(), broker.clone(), test_config());
        assert_eq!(processor.process_batch().await.unwrap(), 1);

        let records = broker.records(topics::PROFILE_USER_EVENT).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, account_id.to_string());
        assert_eq!(records[0].header("event_id"), Some(event.id.to_string().as_str()));
        let decoded: ProfileUpdatedEvent = event_schema::decode_event(&records[0].payload).unwrap();
        assert_eq!(decoded.full_name, "Alice");

        assert!(outbox.pending().await.is_empty());
        assert_eq!(processor.process_batch().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failure_holds_back_later_events_of_same_aggregate_only() {
        let outbox = Arc::new(MemoryOutbox::new());
        let blocked = Uuid::new_v4();
        let healthy = Uuid::new_v4();
        outbox.push(profile_event(blocked, "v1")).await;
        outbox.push(profile_event(healthy, "other")).await;
        outbox.push(profile_event(blocked, "v2")).await;

        let publisher = Arc::new(FlakyPublisher {
            inner: InMemoryBroker::new(2),
            failing_key: blocked.to_string(),
            down: AtomicBool::new(true),
        });
        let processor = OutboxProcessor::new(outbox.clone(), publisher.clone(), test_config());

        assert_eq!(processor.process_batch().await.unwrap(), 1);
        let pending = outbox.pending().await;
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].retry_count, 1);
        assert!(pending[0].last_error.is_some());
        // v2 was never attempted
        assert_eq!(pending[1].retry_count, 0);

        publisher.down.store(false, Ordering::SeqCst);
        assert_eq!(processor.drain().await.unwrap(), 2);

        let names: Vec<String> = publisher
            .inner
            .records(topics::PROFILE_USER_EVENT)
            .await
            .into_iter()
            .filter(|r| r.key == blocked.to_string())
            .map(|r| event_schema::decode_event::<ProfileUpdatedEvent>(&r.payload).unwrap().full_name)
            .collect();
        assert_eq!(names, vec!["v1", "v2"]);
    }

    #[tokio::test]
    async fn parks_events_past_max_retries() {
        let outbox = Arc::new(MemoryOutbox::new());
        let account_id = Uuid::new_v4();
        let mut event = profile_event(account_id, "stuck");
        event.retry_count = 3;
        outbox.push(event).await;

        let config = OutboxConfig {
            max_retries: 3,
            ..test_config()
        };
        let broker = Arc::new(InMemoryBroker::new(1));
        let processor = OutboxProcessor::new(outbox.clone(), broker.clone(), config);

        assert_eq!(processor.process_batch().await.unwrap(), 0);
        assert!(broker.records(topics::PROFILE_USER_EVENT).await.is_empty());
        assert_eq!(outbox.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn parked_events_at_the_head_do_not_starve_newer_ones() {
        let outbox = Arc::new(MemoryOutbox::new());
        for name in ["stuck-1", "stuck-2"] {
            let mut event = profile_event(Uuid::new_v4(), name);
            event.retry_count = 10;
            outbox.push(event).await;
        }
        let healthy = Uuid::new_v4();
        outbox.push(profile_event(healthy, "fine")).await;

        let config = OutboxConfig {
            batch_size: 2,
            ..test_config()
        };
        let broker = Arc::new(InMemoryBroker::new(1));
        let processor = OutboxProcessor::new(outbox.clone(), broker.clone(), config);

        assert_eq!(processor.process_batch().await.unwrap(), 1);
        let records = broker.records(topics::PROFILE_USER_EVENT).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, healthy.to_string());
        assert_eq!(outbox.pending().await.len(), 2);
    }

    #[tokio::test]
    async fn parked_event_still_holds_back_its_aggregate() {
        let outbox = Arc::new(MemoryOutbox::new());
        let account_id = Uuid::new_v4();
        let mut stuck = profile_event(account_id, "v1");
        stuck.retry_count = 10;
        outbox.push(stuck).await;
        outbox.push(profile_event(account_id, "v2")).await;

        let broker = Arc::new(InMemoryBroker::new(1));
        let processor = OutboxProcessor::new(outbox.clone(), broker.clone(), test_config());

        assert_eq!(processor.drain().await.unwrap(), 0);
        assert!(broker.records(topics::PROFILE_USER_EVENT).await.is_empty());
    }

    #[tokio::test]
    async fn failed_publish_is_rescheduled_without_stalling_the_batch() {
        let outbox = Arc::new(MemoryOutbox::new());
        let failing = Uuid::new_v4();
        let healthy = Uuid::new_v4();
        let mut retried = profile_event(failing, "v1");
        retried.retry_count = 3;
        retried.next_attempt_at = Some(Utc::now() - chrono::Duration::seconds(1));
        outbox.push(retried).await;
        outbox.push(profile_event(healthy, "other")).await;
        outbox.push(profile_event(failing, "v2")).await;

        let publisher = Arc::new(FlakyPublisher {
            inner: InMemoryBroker::new(2),
            failing_key: failing.to_string(),
            down: AtomicBool::new(true),
        });
        let config = OutboxConfig {
            retry_base: Duration::from_secs(3600),
            ..OutboxConfig::default()
        };
        let processor = OutboxProcessor::new(outbox.clone(), publisher.clone(), config);

        let published = tokio::time::timeout(Duration::from_secs(5), processor.process_batch())
            .await
            .expect("batch must not wait out the backoff")
            .unwrap();
        assert_eq!(published, 1);

        let pending = outbox.pending().await;
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].retry_count, 4);
        let next = pending[0].next_attempt_at.unwrap();
        assert!(next > Utc::now() + chrono::Duration::minutes(59));

        // not due yet: v1 is skipped and v2 waits behind it
        publisher.down.store(false, Ordering::SeqCst);
        assert_eq!(processor.process_batch().await.unwrap(), 0);
        assert_eq!(outbox.pending().await.len(), 2);
    }

    #[tokio::test]
    async fn reaching_max_retries_parks_the_event() {
        let outbox = Arc::new(MemoryOutbox::new());
        let account_id = Uuid::new_v4();
        let mut event = profile_event(account_id, "v1");
        event.retry_count = 2;
        outbox.push(event).await;

        let publisher = Arc::new(FlakyPublisher {
            inner: InMemoryBroker::new(1),
            failing_key: account_id.to_string(),
            down: AtomicBool::new(true),
        });
        let config = OutboxConfig {
            max_retries: 3,
            ..test_config()
        };
        let processor = OutboxProcessor::new(outbox.clone(), publisher.clone(), config);

        assert_eq!(processor.process_batch().await.unwrap(), 0);
        publisher.down.store(false, Ordering::SeqCst);
        assert_eq!(processor.drain().await.unwrap(), 0);
        assert_eq!(outbox.pending().await[0].retry_count, 3);
    }

    #[tokio::test]
    async fn mark_unknown_event_is_not_found() {
        let outbox = MemoryOutbox::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            outbox.mark_published(id).await,
            Err(OutboxError::EventNotFound(found)) if found == id
        ));
    }
}
