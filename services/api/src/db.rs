//! Data Access Layer
//!
//! The gateway persists messages through the `MessageStore` trait. Two
//! implementations exist: an in-memory store (the default) and a PostgreSQL
//! store backed by `sqlx`, selected when `DATABASE_URL` is configured.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;
use voxchat_core::{Message, NewMessage};

use crate::models::{MessageRecord, StoredSender};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists a new message and returns the stored record.
    async fn create_message(&self, new: NewMessage) -> Result<Message>;

    /// All stored messages, oldest first.
    async fn all_messages(&self) -> Result<Vec<Message>>;

    /// The messages of one session, oldest first.
    async fn messages_for_session(&self, session_id: Uuid) -> Result<Vec<Message>>;
}

#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<Message>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create_message(&self, new: NewMessage) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            session_id: new.session_id,
            sender: new.sender,
            content: new.content,
            timestamp: Utc::now(),
            should_speak: None,
        };
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn all_messages(&self) -> Result<Vec<Message>> {
        Ok(self.messages.read().await.clone())
    }

    async fn messages_for_session(&self, session_id: Uuid) -> Result<Vec<Message>> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }
}

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    /// Creates a new `PgMessageStore` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn create_message(&self, new: NewMessage) -> Result<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (session_id, sender, content)
            VALUES ($1, $2, $3)
            RETURNING id, session_id, sender, content, created_at
            "#,
        )
        .bind(new.session_id)
        .bind(StoredSender::from(new.sender))
        .bind(&new.content)
        .fetch_one(&self.pool)
        .await?;
        Ok(record.into())
    }

    async fn all_messages(&self) -> Result<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, session_id, sender, content, created_at
            FROM messages
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records.into_iter().map(Message::from).collect())
    }

    async fn messages_for_session(&self, session_id: Uuid) -> Result<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, session_id, sender, content, created_at
            FROM messages
            WHERE session_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records.into_iter().map(Message::from).collect())
    }
}
