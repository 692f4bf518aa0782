//! # Event Bus
//!
//! Publisher and consumer contracts for the domain-event topics shared by
//! Agora services, plus two brokers that honour them:
//!
//! - [`memory::InMemoryBroker`]: an append-only, key-partitioned log used by
//!   tests and the in-process cluster
//! - `kafka` (feature `kafka`, on by default): rdkafka producer and consumer
//!
//! ## Delivery contract
//!
//! - Records sharing a key land in one partition and are consumed in publish order
//! - Delivery is at-least-once: an offset is committed only after the handler
//!   returns `Ok`, a failing record is redelivered and blocks its partition
//! - Handlers must therefore be idempotent (upsert, never insert-only)

use async_trait::async_trait;
use event_schema::EventEnvelope;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub mod broker;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

pub use broker::Broker;
pub use memory::{InMemoryBroker, MemoryConsumer, PollStats};

pub type BusResult<T> = Result<T, BusError>;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Broker refused or timed out the write
    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Consumer error: {0}")]
    Consumer(String),

    #[error("Invalid broker configuration: {0}")]
    Configuration(String),
}

/// A message to be appended to a topic.
#[derive(Debug, Clone)]
pub struct OutgoingEvent {
    pub topic: String,
    /// Partition key; the subject id for domain events
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: BTreeMap<String, String>,
}

impl OutgoingEvent {
    pub fn new(topic: impl Into<String>, key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            payload,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// A message as delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: BTreeMap<String, String>,
    pub partition: u32,
    pub offset: u64,
}

impl EventRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: OutgoingEvent) -> BusResult<()>;
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    async fn publish(&self, event: OutgoingEvent) -> BusResult<()> {
        (**self).publish(event).await
    }
}

/// Projection logic invoked once per delivered record.
///
/// Returning `Err` leaves the offset uncommitted so the same record is
/// delivered again.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, record: &EventRecord) -> anyhow::Result<()>;
}

#[async_trait]
impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    async fn handle(&self, record: &EventRecord) -> anyhow::Result<()> {
        (**self).handle(record).await
    }
}

/// Serializes an envelope and publishes it keyed by `key`.
pub async fn publish_envelope<T: Serialize + Send + Sync>(
    publisher: &dyn EventPublisher,
    topic: &str,
    key: Uuid,
    envelope: &EventEnvelope<T>,
) -> BusResult<()> {
    publisher.publish(envelope_to_event(topic, key, envelope)?).await
}

pub fn envelope_to_event<T: Serialize>(
    topic: &str,
    key: Uuid,
    envelope: &EventEnvelope<T>,
) -> BusResult<OutgoingEvent> {
    let payload = serde_json::to_vec(envelope)?;
    let correlation_id = envelope.correlation_id.unwrap_or(envelope.event_id);

    Ok(OutgoingEvent::new(topic, key.to_string(), payload)
        .with_header("event_type", envelope.event_type.clone())
        .with_header("event_id", envelope.event_id.to_string())
        .with_header("correlation_id", correlation_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_schema::{topics, UserRegisteredEvent};

    #[tokio::test]
    async fn envelope_is_keyed_by_subject_and_tagged() {
        let broker = InMemoryBroker::new(4);
        let account_id = Uuid::new_v4();
        let envelope = UserRegisteredEvent {
            account_id,
            full_name: "Alice".into(),
        }
        .envelope("auth-service");

        publish_envelope(&broker, topics::AUTH_USER_EVENT, account_id, &envelope)
            .await
            .unwrap();

        let records = broker.records(topics::AUTH_USER_EVENT).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, account_id.to_string());
        assert_eq!(records[0].header("event_type"), Some("UserRegistered"));
        assert_eq!(records[0].header("event_id"), Some(envelope.event_id.to_string().as_str()));
    }
}
