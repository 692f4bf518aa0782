/// Sending and reading chat messages
use error_types::{Result, ServiceError};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    ChatMessageDto, Conversation, ConversationDto, NewMessage, SendMessageRequest,
    DEFAULT_CONTENT_TYPE,
};
use crate::registry::{ConnectionRegistry, Subscription};
use crate::repository::MessageRepository;

/// Pairs share these locks by hash, so memory stays fixed however many
/// conversations the process has seen.
const SEND_LOCK_STRIPES: usize = 64;

type PairKey = (Uuid, Uuid);

fn pair_key(a: Uuid, b: Uuid) -> PairKey {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Clone)]
pub struct ChatService {
    messages: Arc<dyn MessageRepository>,
    registry: ConnectionRegistry,
    send_locks: Arc<[Mutex<()>]>,
}

impl ChatService {
    pub fn new(messages: Arc<dyn MessageRepository>, registry: ConnectionRegistry) -> Self {
        Self {
            messages,
            registry,
            send_locks: (0..SEND_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    fn send_lock_index(&self, a: Uuid, b: Uuid) -> usize {
        let mut hasher = DefaultHasher::new();
        pair_key(a, b).hash(&mut hasher);
        (hasher.finish() % self.send_locks.len() as u64) as usize
    }

    fn send_lock(&self, a: Uuid, b: Uuid) -> &Mutex<()> {
        &self.send_locks[self.send_lock_index(a, b)]
    }

    /// Stores the message, then pushes it to live subscribers. The pair lock
    /// spans both steps so pushes leave in `seq` order.
    pub async fn send(&self, sender: Uuid, req: SendMessageRequest) -> Result<ChatMessageDto> {
        req.validate()?;
        if req.receiver_id == sender {
            return Err(ServiceError::invalid_input("cannot send a message to yourself"));
        }
        if req.content.trim().is_empty() {
            return Err(ServiceError::invalid_input("content must not be empty"));
        }

        let _guard = self.send_lock(sender, req.receiver_id).lock().await;

        let stored = self
            .messages
            .append(&NewMessage {
                sender,
                receiver: req.receiver_id,
                content: req.content,
                content_type: req
                    .content_type
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            })
            .await?;
        let dto = ChatMessageDto::from(stored);
        let delivered = self.registry.broadcast(&dto).await;

        info!(
            conversation_id = %dto.conversation_id,
            seq = dto.seq,
            delivered,
            "Chat message sent"
        );
        Ok(dto)
    }

    pub async fn conversation_with(&self, account_id: Uuid, receiver: Uuid) -> Result<Option<ConversationDto>> {
        Ok(self
            .messages
            .find_conversation(account_id, receiver)
            .await?
            .map(ConversationDto::from))
    }

    /// Missing conversations and foreign ones both read as not found.
    pub async fn participant_conversation(&self, account_id: Uuid, conversation_id: Uuid) -> Result<Conversation> {
        self.messages
            .find_conversation_by_id(conversation_id)
            .await?
            .filter(|c| c.has_participant(account_id))
            .ok_or_else(|| ServiceError::not_found("Conversation", conversation_id))
    }

    pub async fn messages(&self, account_id: Uuid, conversation_id: Uuid) -> Result<Vec<ChatMessageDto>> {
        self.participant_conversation(account_id, conversation_id).await?;
        let messages = self.messages.messages(conversation_id).await?;
        Ok(messages.into_iter().map(ChatMessageDto::from).collect())
    }

    pub async fn subscribe(&self, account_id: Uuid, conversation_id: Uuid) -> Result<Subscription> {
        self.participant_conversation(account_id, conversation_id).await?;
        Ok(self.registry.subscribe(conversation_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryMessageRepository;

    fn service() -> ChatService {
        ChatService::new(Arc::new(MemoryMessageRepository::new()), ConnectionRegistry::new())
    }

    fn to(receiver: Uuid, content: &str) -> SendMessageRequest {
        SendMessageRequest {
            receiver_id: receiver,
            content: content.into(),
            content_type: None,
        }
    }

    #[tokio::test]
    async fn rejects_self_and_empty_messages() {
        let service = service();
        let me = Uuid::new_v4();
        let err = service.send(me, to(me, "hi")).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { .. }));

        let err = service.send(me, to(Uuid::new_v4(), "  ")).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn send_locks_stay_fixed_across_many_pairs() {
        let service = service();
        for _ in 0..200 {
            let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
            service.send(a, to(b, "hi")).await.unwrap();
            assert_eq!(service.send_lock_index(a, b), service.send_lock_index(b, a));
        }
        assert_eq!(service.send_locks.len(), SEND_LOCK_STRIPES);
    }

    #[tokio::test]
    async fn outsiders_cannot_read_or_subscribe() {
        let service = service();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let sent = service.send(a, to(b, "hi")).await.unwrap();
        assert_eq!(sent.content_type, DEFAULT_CONTENT_TYPE);

        let read = service.messages(b, sent.conversation_id).await.unwrap();
        assert_eq!(read, vec![sent.clone()]);

        let outsider = Uuid::new_v4();
        assert!(matches!(
            service.messages(outsider, sent.conversation_id).await.unwrap_err(),
            ServiceError::NotFound { .. }
        ));
        assert!(service.subscribe(outsider, sent.conversation_id).await.is_err());
        assert!(service.conversation_with(outsider, a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn subscribers_see_concurrent_sends_in_seq_order() {
        let service = service();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let first = service.send(a, to(b, "open")).await.unwrap();
        let mut subscription = service.subscribe(b, first.conversation_id).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..30 {
            let service = service.clone();
            let (from, to_id) = if i % 2 == 0 { (a, b) } else { (b, a) };
            handles.push(tokio::spawn(async move {
                service.send(from, to(to_id, "msg")).await.unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..30 {
            seen.push(subscription.receiver.recv().await.unwrap().seq);
        }
        assert_eq!(seen, (2..=31).collect::<Vec<_>>());
    }
}
