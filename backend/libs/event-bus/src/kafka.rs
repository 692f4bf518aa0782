//! rdkafka producer and consumer.
//!
//! The consumer commits manually, and only after the handler succeeds. A
//! failing record is retried in place so later records of the same partition
//! never overtake it.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::{BusError, BusResult, EventHandler, EventPublisher, EventRecord, OutgoingEvent};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
}

impl KafkaPublisher {
    pub fn new(brokers: &str, client_id: &str) -> BusResult<Self> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", client_id)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("message.timeout.ms", "30000")
            .create::<FutureProducer>()
            .map_err(|e| BusError::Configuration(format!("Failed to create Kafka producer: {e}")))?;

        Ok(Self { producer })
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, event: OutgoingEvent) -> BusResult<()> {
        let headers = event
            .headers
            .iter()
            .fold(OwnedHeaders::new(), |headers, (key, value)| {
                headers.insert(Header {
                    key,
                    value: Some(value.as_bytes()),
                })
            });

        let record = FutureRecord::to(&event.topic)
            .key(&event.key)
            .payload(&event.payload)
            .headers(headers);

        self.producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(error, _)| {
                warn!(topic = %event.topic, "Failed to send Kafka event: {:?}", error);
                BusError::Publish(format!("Failed to publish event to {}: {}", event.topic, error))
            })?;

        Ok(())
    }
}

pub struct KafkaConsumer {
    consumer: StreamConsumer,
    group_id: String,
    retry_backoff: Duration,
}

impl KafkaConsumer {
    pub fn new(brokers: &str, group_id: &str, topics: &[&str]) -> BusResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| BusError::Configuration(format!("Failed to create Kafka consumer: {e}")))?;

        consumer
            .subscribe(topics)
            .map_err(|e| BusError::Consumer(format!("Failed to subscribe to {topics:?}: {e}")))?;

        info!(group = group_id, topics = ?topics, "Created Kafka consumer");

        Ok(Self {
            consumer,
            group_id: group_id.to_string(),
            retry_backoff: Duration::from_secs(1),
        })
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Consumes until `shutdown` resolves. An in-flight record that has not
    /// been handled successfully is left uncommitted.
    pub async fn run<H, F>(self, handler: H, shutdown: F)
    where
        H: EventHandler,
        F: Future<Output = ()>,
    {
        info!(group = %self.group_id, "Starting Kafka consumer");
        tokio::pin!(shutdown);

        loop {
            let message = tokio::select! {
                _ = &mut shutdown => break,
                received = self.consumer.recv() => received,
            };

            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    error!(group = %self.group_id, "Kafka consumer error: {}", e);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(Duration::from_secs(5)) => continue,
                    }
                }
            };

            let record = to_record(&message);
            let mut attempt: u32 = 0;
            loop {
                match handler.handle(&record).await {
                    Ok(()) => {
                        if let Err(e) = self.consumer.commit_message(&message, CommitMode::Async) {
                            warn!(offset = record.offset, "Failed to commit offset: {}", e);
                        }
                        break;
                    }
                    Err(e) => {
                        attempt += 1;
                        error!(
                            group = %self.group_id,
                            topic = %record.topic,
                            partition = record.partition,
                            offset = record.offset,
                            attempt,
                            error = %e,
                            "Event handler failed; retrying"
                        );
                        tokio::select! {
                            _ = &mut shutdown => {
                                info!(group = %self.group_id, "Kafka consumer stopped");
                                return;
                            }
                            _ = tokio::time::sleep(self.retry_backoff) => {}
                        }
                    }
                }
            }
        }

        info!(group = %self.group_id, "Kafka consumer stopped");
    }
}

fn to_record(message: &BorrowedMessage<'_>) -> EventRecord {
    let headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .filter_map(|header| {
                    let value = std::str::from_utf8(header.value?).ok()?;
                    Some((header.key.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    EventRecord {
        topic: message.topic().to_string(),
        key: message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default(),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers,
        partition: message.partition().max(0) as u32,
        offset: message.offset().max(0) as u64,
    }
}
