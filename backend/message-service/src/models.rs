/// Conversations, chat messages and their wire shapes
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_CONTENT_TYPE: &str = "TEXT";

/// One per unordered pair of accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub user1: Uuid,
    pub user2: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn between(a: Uuid, b: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user1: a,
            user2: b,
            created_at: Utc::now(),
        }
    }

    pub fn has_participant(&self, account_id: Uuid) -> bool {
        self.user1 == account_id || self.user2 == account_id
    }

    pub fn joins(&self, a: Uuid, b: Uuid) -> bool {
        (self.user1 == a && self.user2 == b) || (self.user1 == b && self.user2 == a)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Uuid,
    pub receiver: Uuid,
    pub content: String,
    pub content_type: String,
    pub timestamp: DateTime<Utc>,
    /// 1-based, gapless within a conversation
    pub seq: i64,
}

/// Message fields before the store assigns a conversation and `seq`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: Uuid,
    pub receiver: Uuid,
    pub content: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub receiver_id: Uuid,
    #[validate(length(max = 10000, message = "content must be at most 10000 characters"))]
    pub content: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 32, message = "contentType must be 1-32 characters"))]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationQuery {
    pub receiver_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub conversation_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageDto {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Uuid,
    pub receiver: Uuid,
    pub content: String,
    pub content_type: String,
    pub timestamp: DateTime<Utc>,
    pub seq: i64,
}

impl From<ChatMessage> for ChatMessageDto {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            conversation_id: m.conversation_id,
            sender: m.sender,
            receiver: m.receiver,
            content: m.content,
            content_type: m.content_type,
            timestamp: m.timestamp,
            seq: m.seq,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    pub id: Uuid,
    pub user1: Uuid,
    pub user2: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationDto {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            user1: c.user1,
            user2: c.user2,
            created_at: c.created_at,
        }
    }
}
