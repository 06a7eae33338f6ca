//! API and Database Models
//!
//! Row types for `sqlx` and the response bodies documented with `utoipa`.
//! The wire-level `Message` itself lives in `voxchat_core`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;
use voxchat_core::{Message, Sender};

#[derive(sqlx::Type, Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[sqlx(type_name = "message_sender", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StoredSender {
    User,
    Bot,
}

impl fmt::Display for StoredSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredSender::User => write!(f, "user"),
            StoredSender::Bot => write!(f, "bot"),
        }
    }
}

impl From<Sender> for StoredSender {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::User => StoredSender::User,
            Sender::Bot => StoredSender::Bot,
        }
    }
}

impl From<StoredSender> for Sender {
    fn from(sender: StoredSender) -> Self {
        match sender {
            StoredSender::User => Sender::User,
            StoredSender::Bot => Sender::Bot,
        }
    }
}

/// A persisted message as stored in the `messages` table.
#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    #[schema(value_type = String, example = "user")]
    pub sender: StoredSender,
    pub content: String,
    #[sqlx(rename = "created_at")]
    pub timestamp: DateTime<Utc>,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Message {
            id: record.id,
            session_id: record.session_id,
            sender: record.sender.into(),
            content: record.content,
            timestamp: record.timestamp,
            should_speak: None,
        }
    }
}

impl From<Message> for MessageRecord {
    fn from(message: Message) -> Self {
        MessageRecord {
            id: message.id,
            session_id: message.session_id,
            sender: message.sender.into(),
            content: message.content,
            timestamp: message.timestamp,
        }
    }
}

/// A live gateway session, as reported by `GET /api/sessions`.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
