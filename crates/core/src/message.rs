//! Wire-level message records.
//!
//! A `Message` is what the gateway persists for every accepted text or voice
//! turn and what it pushes to the client inside `message` and `voice_response`
//! frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Who authored a message.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Bot => write!(f, "bot"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Only present on bot replies to voice turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_speak: Option<bool>,
}

impl Message {
    pub fn new(session_id: Uuid, sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            sender,
            content: content.into(),
            timestamp: Utc::now(),
            should_speak: None,
        }
    }

    pub fn user(session_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(session_id, Sender::User, content)
    }

    pub fn bot(session_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(session_id, Sender::Bot, content)
    }

    /// Marks the message as one the client should read aloud.
    pub fn speaking(mut self) -> Self {
        self.should_speak = Some(true);
        self
    }
}

/// The fields a caller supplies when asking the store to create a message.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub session_id: Uuid,
    pub sender: Sender,
    pub content: String,
}
