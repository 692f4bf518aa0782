//! Append-only in-process log with Kafka-like semantics.
//!
//! Each topic has a fixed number of partitions; a record's partition is derived
//! from its key so per-key order is publish order. Consumer groups track their
//! own committed offset per partition.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info};

use crate::{BusResult, EventHandler, EventPublisher, EventRecord, OutgoingEvent};

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Default)]
struct BrokerState {
    /// topic -> partitions -> records
    topics: HashMap<String, Vec<Vec<EventRecord>>>,
    /// (group, topic, partition) -> next offset to deliver
    committed: HashMap<(String, String, u32), u64>,
}

struct BrokerInner {
    partitions: u32,
    state: Mutex<BrokerState>,
    /// Bumped on every append so idle consumers wake up
    appended: watch::Sender<u64>,
}

#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new(partitions: u32) -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            inner: Arc::new(BrokerInner {
                partitions: partitions.max(1),
                state: Mutex::new(BrokerState::default()),
                appended,
            }),
        }
    }

    pub fn partition_for(&self, key: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % u64::from(self.inner.partitions)) as u32
    }

    /// Creates a consumer that starts from the group's committed offsets
    /// (the beginning of each partition for a new group).
    pub fn subscribe(&self, group: &str, topics: &[&str]) -> MemoryConsumer {
        MemoryConsumer {
            broker: self.clone(),
            group: group.to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            appended: self.inner.appended.subscribe(),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Every record of a topic, partition by partition.
    pub async fn records(&self, topic: &str) -> Vec<EventRecord> {
        let state = self.inner.state.lock().await;
        state
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Appends a copy of an already delivered record, simulating a broker
    /// redelivery after a lost commit.
    pub async fn redeliver(&self, record: &EventRecord) -> BusResult<()> {
        let mut event = OutgoingEvent::new(record.topic.clone(), record.key.clone(), record.payload.clone());
        event.headers = record.headers.clone();
        self.publish(event).await
    }

    async fn append(&self, event: OutgoingEvent) -> EventRecord {
        let partition = self.partition_for(&event.key);
        let mut state = self.inner.state.lock().await;
        let partitions = state
            .topics
            .entry(event.topic.clone())
            .or_insert_with(|| vec![Vec::new(); self.inner.partitions as usize]);
        let log = &mut partitions[partition as usize];

        let record = EventRecord {
            topic: event.topic,
            key: event.key,
            payload: event.payload,
            headers: event.headers,
            partition,
            offset: log.len() as u64,
        };
        log.push(record.clone());
        record
    }

    async fn fetch(&self, group: &str, topic: &str, partition: u32) -> Option<EventRecord> {
        let state = self.inner.state.lock().await;
        let offset = state
            .committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
            .unwrap_or(0);
        state
            .topics
            .get(topic)
            .and_then(|partitions| partitions.get(partition as usize))
            .and_then(|log| log.get(offset as usize))
            .cloned()
    }

    async fn commit(&self, group: &str, record: &EventRecord) {
        let mut state = self.inner.state.lock().await;
        state.committed.insert(
            (group.to_string(), record.topic.clone(), record.partition),
            record.offset + 1,
        );
    }

    /// Records not yet committed by `group` across `topics`.
    pub async fn lag(&self, group: &str, topics: &[&str]) -> u64 {
        let state = self.inner.state.lock().await;
        topics
            .iter()
            .filter_map(|topic| state.topics.get(*topic).map(|p| (*topic, p)))
            .flat_map(|(topic, partitions)| {
                partitions.iter().enumerate().map(move |(idx, log)| (topic, idx as u32, log.len() as u64))
            })
            .map(|(topic, partition, len)| {
                let committed = state
                    .committed
                    .get(&(group.to_string(), topic.to_string(), partition))
                    .copied()
                    .unwrap_or(0);
                len.saturating_sub(committed)
            })
            .sum()
    }
}

#[async_trait]
impl EventPublisher for InMemoryBroker {
    async fn publish(&self, event: OutgoingEvent) -> BusResult<()> {
        let record = self.append(event).await;
        debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            "Appended event to in-memory log"
        );
        self.inner.appended.send_modify(|seq| *seq += 1);
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    pub delivered: usize,
    pub failed: usize,
}

/// Single consumer of a group. Partitions are walked in order and a failed
/// record stops its partition until the next poll.
pub struct MemoryConsumer {
    broker: InMemoryBroker,
    group: String,
    topics: Vec<String>,
    appended: watch::Receiver<u64>,
    retry_backoff: Duration,
}

impl MemoryConsumer {
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Delivers every currently available record once.
    pub async fn poll(&mut self, handler: &dyn EventHandler) -> PollStats {
        let mut stats = PollStats::default();

        for topic in &self.topics {
            for partition in 0..self.broker.inner.partitions {
                while let Some(record) = self.broker.fetch(&self.group, topic, partition).await {
                    match handler.handle(&record).await {
                        Ok(()) => {
                            self.broker.commit(&self.group, &record).await;
                            stats.delivered += 1;
                        }
                        Err(e) => {
                            error!(
                                group = %self.group,
                                topic = %record.topic,
                                partition = record.partition,
                                offset = record.offset,
                                error = %e,
                                "Event handler failed; record will be redelivered"
                            );
                            stats.failed += 1;
                            break;
                        }
                    }
                }
            }
        }

        stats
    }

    /// Polls until a pass delivers nothing.
    pub async fn drain(&mut self, handler: &dyn EventHandler) -> PollStats {
        let mut total = PollStats::default();
        loop {
            let stats = self.poll(handler).await;
            total.delivered += stats.delivered;
            total.failed += stats.failed;
            if stats.delivered == 0 {
                return total;
            }
        }
    }

    /// Consumes until `shutdown` resolves.
    pub async fn run<H, F>(mut self, handler: H, shutdown: F)
    where
        H: EventHandler,
        F: Future<Output = ()>,
    {
        info!(group = %self.group, topics = ?self.topics, "Starting in-memory consumer");
        tokio::pin!(shutdown);

        loop {
            let stats = self.poll(&handler).await;

            if stats.failed > 0 {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(self.retry_backoff) => continue,
                }
            }

            tokio::select! {
                _ = &mut shutdown => break,
                changed = self.appended.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(group = %self.group, "In-memory consumer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, Vec<u8>)>>,
        fail_first: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, record: &EventRecord) -> anyhow::Result<()> {
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("transient failure");
            }
            self.seen
                .lock()
                .await
                .push((record.key.clone(), record.payload.clone()));
            Ok(())
        }
    }

    fn event(key: &str, body: &str) -> OutgoingEvent {
        OutgoingEvent::new("t", key, body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn same_key_always_lands_in_same_partition() {
        let broker = InMemoryBroker::new(8);
        for i in 0..5 {
            broker.publish(event("user-1", &i.to_string())).await.unwrap();
        }

        let records = broker.records("t").await;
        assert!(records.iter().all(|r| r.partition == records[0].partition));
        let offsets: Vec<u64> = records.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn per_key_order_is_preserved() {
        let broker = InMemoryBroker::new(4);
        for i in 0..10 {
            broker.publish(event("a", &format!("a{i}"))).await.unwrap();
            broker.publish(event("b", &format!("b{i}"))).await.unwrap();
        }

        let handler = Recorder::default();
        let mut consumer = broker.subscribe("g", &["t"]);
        let stats = consumer.drain(&handler).await;
        assert_eq!(stats.delivered, 20);

        let seen = handler.seen.lock().await;
        for key in ["a", "b"] {
            let bodies: Vec<String> = seen
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, p)| String::from_utf8(p.clone()).unwrap())
                .collect();
            let expected: Vec<String> = (0..10).map(|i| format!("{key}{i}")).collect();
            assert_eq!(bodies, expected);
        }
    }

    #[tokio::test]
    async fn failed_record_is_redelivered_not_skipped() {
        let broker = InMemoryBroker::new(1);
        broker.publish(event("k", "first")).await.unwrap();
        broker.publish(event("k", "second")).await.unwrap();

        let handler = Recorder {
            fail_first: AtomicUsize::new(1),
            ..Default::default()
        };
        let mut consumer = broker.subscribe("g", &["t"]);

        let first = consumer.poll(&handler).await;
        assert_eq!(first, PollStats { delivered: 0, failed: 1 });
        assert_eq!(broker.lag("g", &["t"]).await, 2);

        let second = consumer.poll(&handler).await;
        assert_eq!(second.delivered, 2);
        let seen = handler.seen.lock().await;
        assert_eq!(seen[0].1, b"first".to_vec());
        assert_eq!(seen[1].1, b"second".to_vec());
    }

    #[tokio::test]
    async fn groups_have_independent_offsets() {
        let broker = InMemoryBroker::new(2);
        broker.publish(event("k", "x")).await.unwrap();

        let handler = Recorder::default();
        assert_eq!(broker.subscribe("one", &["t"]).drain(&handler).await.delivered, 1);
        assert_eq!(broker.subscribe("two", &["t"]).drain(&handler).await.delivered, 1);
        // a fresh consumer of an existing group resumes at its committed offset
        assert_eq!(broker.subscribe("one", &["t"]).drain(&handler).await.delivered, 0);
    }

    #[tokio::test]
    async fn run_wakes_on_publish_and_stops_on_shutdown() {
        let broker = InMemoryBroker::new(2);
        let handler = Arc::new(Recorder::default());
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let consumer = broker.subscribe("g", &["t"]);
        let task = tokio::spawn(consumer.run(handler.clone(), async {
            let _ = stop_rx.await;
        }));

        broker.publish(event("k", "hello")).await.unwrap();
        for _ in 0..50 {
            if !handler.seen.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handler.seen.lock().await.len(), 1);

        stop_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
