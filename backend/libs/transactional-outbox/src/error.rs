//! Error types for the transactional outbox library.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for outbox operations.
pub type OutboxResult<T> = Result<T, OutboxError>;

#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    /// Broker did not accept the event
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Outbox error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<event_bus::BusError> for OutboxError {
    fn from(err: event_bus::BusError) -> Self {
        OutboxError::PublishFailed(err.to_string())
    }
}
