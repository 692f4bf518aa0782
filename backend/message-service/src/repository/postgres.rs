use async_trait::async_trait;
use chrono::Utc;
use error_types::Result;
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use super::MessageRepository;
use crate::models::{ChatMessage, Conversation, NewMessage};

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_or_create(
        tx: &mut Transaction<'_, Postgres>,
        a: Uuid,
        b: Uuid,
    ) -> Result<Uuid> {
        // the unique index on the ordered pair makes concurrent creators converge
        sqlx::query(
            r#"
            INSERT INTO conversations (id, user1, user2, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (LEAST(user1, user2), GREATEST(user1, user2)) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(a)
        .bind(b)
        .execute(&mut **tx)
        .await?;

        let id: Uuid = sqlx::query_scalar(
            r#"
            SELECT id FROM conversations
            WHERE LEAST(user1, user2) = LEAST($1, $2) AND GREATEST(user1, user2) = GREATEST($1, $2)
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }
}

fn conversation_from_row(row: &PgRow) -> Result<Conversation> {
    Ok(Conversation {
        id: row.try_get("id")?,
        user1: row.try_get("user1")?,
        user2: row.try_get("user2")?,
        created_at: row.try_get("created_at")?,
    })
}

fn message_from_row(row: &PgRow) -> Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        sender: row.try_get("sender")?,
        receiver: row.try_get("receiver")?,
        content: row.try_get("content")?,
        content_type: row.try_get("content_type")?,
        timestamp: row.try_get("timestamp")?,
        seq: row.try_get("seq")?,
    })
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn find_conversation(&self, a: Uuid, b: Uuid) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            r#"
            SELECT id, user1, user2, created_at FROM conversations
            WHERE LEAST(user1, user2) = LEAST($1, $2) AND GREATEST(user1, user2) = GREATEST($1, $2)
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(conversation_from_row).transpose()
    }

    async fn find_conversation_by_id(&self, id: Uuid) -> Result<Option<Conversation>> {
        let row = sqlx::query("SELECT id, user1, user2, created_at FROM conversations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(conversation_from_row).transpose()
    }

    async fn append(&self, message: &NewMessage) -> Result<ChatMessage> {
        let mut tx = self.pool.begin().await?;
        let conversation_id = Self::find_or_create(&mut tx, message.sender, message.receiver).await?;

        // row lock on the counter serializes writers of one conversation
        let seq: i64 = sqlx::query_scalar(
            "UPDATE conversations SET last_seq = last_seq + 1 WHERE id = $1 RETURNING last_seq",
        )
        .bind(conversation_id)
        .fetch_one(&mut *tx)
        .await?;

        let stored = ChatMessage {
            id: Uuid::new_v4(),
            conversation_id,
            sender: message.sender,
            receiver: message.receiver,
            content: message.content.clone(),
            content_type: message.content_type.clone(),
            timestamp: Utc::now(),
            seq,
        };

        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, conversation_id, sender, receiver, content, content_type, timestamp, seq)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(stored.id)
        .bind(stored.conversation_id)
        .bind(stored.sender)
        .bind(stored.receiver)
        .bind(&stored.content)
        .bind(&stored.content_type)
        .bind(stored.timestamp)
        .bind(stored.seq)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn messages(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, sender, receiver, content, content_type, timestamp, seq
            FROM chat_messages WHERE conversation_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }
}
