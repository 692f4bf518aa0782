use async_trait::async_trait;
use chrono::Utc;
use error_types::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::MessageRepository;
use crate::models::{ChatMessage, Conversation, NewMessage};

#[derive(Default)]
struct State {
    conversations: Vec<Conversation>,
    messages: HashMap<Uuid, Vec<ChatMessage>>,
}

/// Conversations and messages under one mutex.
#[derive(Clone, Default)]
pub struct MemoryMessageRepository {
    state: Arc<Mutex<State>>,
}

impl MemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn conversation_count(&self) -> usize {
        self.state.lock().await.conversations.len()
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn find_conversation(&self, a: Uuid, b: Uuid) -> Result<Option<Conversation>> {
        let state = self.state.lock().await;
        Ok(state.conversations.iter().find(|c| c.joins(a, b)).cloned())
    }

    async fn find_conversation_by_id(&self, id: Uuid) -> Result<Option<Conversation>> {
        let state = self.state.lock().await;
        Ok(state.conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn append(&self, message: &NewMessage) -> Result<ChatMessage> {
        let mut state = self.state.lock().await;
        let conversation_id = match state
            .conversations
            .iter()
            .find(|c| c.joins(message.sender, message.receiver))
        {
            Some(c) => c.id,
            None => {
                let c = Conversation::between(message.sender, message.receiver);
                let id = c.id;
                state.conversations.push(c);
                id
            }
        };

        let log = state.messages.entry(conversation_id).or_default();
        let stored = ChatMessage {
            id: Uuid::new_v4(),
            conversation_id,
            sender: message.sender,
            receiver: message.receiver,
            content: message.content.clone(),
            content_type: message.content_type.clone(),
            timestamp: Utc::now(),
            seq: log.len() as i64 + 1,
        };
        log.push(stored.clone());
        Ok(stored)
    }

    async fn messages(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>> {
        let state = self.state.lock().await;
        Ok(state.messages.get(&conversation_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_CONTENT_TYPE;

    fn new_message(sender: Uuid, receiver: Uuid, content: &str) -> NewMessage {
        NewMessage {
            sender,
            receiver,
            content: content.into(),
            content_type: DEFAULT_CONTENT_TYPE.into(),
        }
    }

    #[tokio::test]
    async fn both_directions_share_one_conversation() {
        let repo = MemoryMessageRepository::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let first = repo.append(&new_message(a, b, "hi")).await.unwrap();
        let second = repo.append(&new_message(b, a, "hey")).await.unwrap();

        assert_eq!(first.conversation_id, second.conversation_id);
        assert_eq!((first.seq, second.seq), (1, 2));
        assert_eq!(repo.conversation_count().await, 1);
        assert!(repo.find_conversation(b, a).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_senders_get_gapless_sequence() {
        let repo = MemoryMessageRepository::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let mut handles = Vec::new();
        for i in 0..20 {
            let repo = repo.clone();
            let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
            handles.push(tokio::spawn(async move {
                repo.append(&new_message(from, to, "x")).await.unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let conversation = repo.find_conversation(a, b).await.unwrap().unwrap();
        let seqs: Vec<i64> = repo
            .messages(conversation.id)
            .await
            .unwrap()
            .iter()
            .map(|m| m.seq)
            .collect();
        assert_eq!(seqs, (1..=20).collect::<Vec<_>>());
    }
}
