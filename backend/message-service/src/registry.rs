//! Live chat subscribers per conversation
//!
//! Each socket owns an unbounded receiver. Senders are called while the
//! conversation's send lock is held, so every receiver sees `seq` order.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::models::ChatMessageDto;

pub struct Subscription {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub receiver: mpsc::UnboundedReceiver<ChatMessageDto>,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Vec<(Uuid, mpsc::UnboundedSender<ChatMessageDto>)>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, conversation_id: Uuid) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.inner
            .write()
            .await
            .entry(conversation_id)
            .or_default()
            .push((id, tx));
        debug!(%conversation_id, subscriber = %id, "Chat subscriber registered");
        Subscription {
            id,
            conversation_id,
            receiver: rx,
        }
    }

    pub async fn unsubscribe(&self, conversation_id: Uuid, subscriber: Uuid) {
        let mut registry = self.inner.write().await;
        if let Some(subscribers) = registry.get_mut(&conversation_id) {
            subscribers.retain(|(id, _)| *id != subscriber);
            if subscribers.is_empty() {
                registry.remove(&conversation_id);
            }
        }
    }

    /// Returns how many live subscribers received the message.
    pub async fn broadcast(&self, message: &ChatMessageDto) -> usize {
        let mut registry = self.inner.write().await;
        let Some(subscribers) = registry.get_mut(&message.conversation_id) else {
            return 0;
        };
        subscribers.retain(|(_, tx)| tx.send(message.clone()).is_ok());
        let delivered = subscribers.len();
        if subscribers.is_empty() {
            registry.remove(&message.conversation_id);
        }
        delivered
    }

    pub async fn subscriber_count(&self, conversation_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .get(&conversation_id)
            .map_or(0, Vec::len)
    }
}
