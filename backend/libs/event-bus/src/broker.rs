//! Broker selection for service binaries.
//!
//! `EVENT_BROKER` picks the transport: `kafka` (default) or `memory`. The
//! memory log only reaches consumers inside the same process, so it has to
//! be asked for explicitly.

use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{BusError, BusResult, EventHandler, EventPublisher, InMemoryBroker};

const MEMORY_PARTITIONS: u32 = 8;
const DEFAULT_KAFKA_BROKERS: &str = "localhost:9092";

#[derive(Clone)]
pub enum Broker {
    #[cfg(feature = "kafka")]
    Kafka { brokers: String },
    /// Process-local log; only useful when producer and consumers share a process
    Memory(InMemoryBroker),
}

impl Broker {
    /// Reads `EVENT_BROKER` and `KAFKA_BROKERS`.
    pub fn from_env() -> BusResult<Self> {
        let kind = std::env::var("EVENT_BROKER").ok();
        let brokers = std::env::var("KAFKA_BROKERS").ok();
        Self::select(kind.as_deref(), brokers)
    }

    /// Fails for an unknown kind, and for `kafka` in a build without the
    /// `kafka` feature.
    pub fn select(kind: Option<&str>, brokers: Option<String>) -> BusResult<Self> {
        let kind = kind.map(str::trim).filter(|k| !k.is_empty()).unwrap_or("kafka");

        match kind.to_ascii_lowercase().as_str() {
            "memory" => {
                warn!("EVENT_BROKER=memory: events stay inside this process");
                Ok(Self::memory())
            }
            "kafka" => {
                let brokers = brokers
                    .map(|b| b.trim().to_string())
                    .filter(|b| !b.is_empty())
                    .unwrap_or_else(|| DEFAULT_KAFKA_BROKERS.to_string());
                Self::kafka(brokers)
            }
            other => Err(BusError::Configuration(format!(
                "EVENT_BROKER must be `kafka` or `memory`, got `{other}`"
            ))),
        }
    }

    #[cfg(feature = "kafka")]
    fn kafka(brokers: String) -> BusResult<Self> {
        info!(brokers = %brokers, "Using Kafka event bus");
        Ok(Broker::Kafka { brokers })
    }

    #[cfg(not(feature = "kafka"))]
    fn kafka(brokers: String) -> BusResult<Self> {
        Err(BusError::Configuration(format!(
            "Kafka at {brokers} requested but this build has no `kafka` feature; \
             rebuild with it or set EVENT_BROKER=memory"
        )))
    }

    pub fn memory() -> Self {
        Broker::Memory(InMemoryBroker::new(MEMORY_PARTITIONS))
    }

    pub fn publisher(&self, client_id: &str) -> BusResult<Arc<dyn EventPublisher>> {
        match self {
            #[cfg(feature = "kafka")]
            Broker::Kafka { brokers } => Ok(Arc::new(crate::kafka::KafkaPublisher::new(brokers, client_id)?)),
            Broker::Memory(broker) => {
                info!(client_id, "Publishing to in-memory event log");
                Ok(Arc::new(broker.clone()))
            }
        }
    }

    /// Runs a consumer group member until `shutdown` resolves.
    pub async fn consume<H, F>(&self, group: &str, topics: &[&str], handler: H, shutdown: F) -> BusResult<()>
    where
        H: EventHandler,
        F: Future<Output = ()>,
    {
        match self {
            #[cfg(feature = "kafka")]
            Broker::Kafka { brokers } => {
                crate::kafka::KafkaConsumer::new(brokers, group, topics)?
                    .run(handler, shutdown)
                    .await;
            }
            Broker::Memory(broker) => broker.subscribe(group, topics).run(handler, shutdown).await,
        }
        Ok(())
    }
}
