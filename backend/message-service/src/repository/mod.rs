pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use error_types::Result;
use uuid::Uuid;

use crate::models::{ChatMessage, Conversation, NewMessage};

pub use memory::MemoryMessageRepository;
pub use postgres::PgMessageRepository;

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Either participant order finds the same conversation.
    async fn find_conversation(&self, a: Uuid, b: Uuid) -> Result<Option<Conversation>>;

    async fn find_conversation_by_id(&self, id: Uuid) -> Result<Option<Conversation>>;

    /// Finds or creates the pair's conversation and stores the message with
    /// the next `seq`, atomically.
    async fn append(&self, message: &NewMessage) -> Result<ChatMessage>;

    /// Ascending `seq`.
    async fn messages(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>>;
}
