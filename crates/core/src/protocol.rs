//! Defines the WebSocket frame protocol between the client and the gateway.
//!
//! Every frame is a JSON envelope `{ "type": ..., "data": { ... } }`.

use crate::message::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frames sent from the client to the gateway.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    /// A typed text turn.
    Message { content: String },
    /// A spoken turn, already transcribed on the client.
    VoiceMessage {
        #[serde(rename = "transcribedText")]
        transcribed_text: String,
    },
    /// Barge-in: the user started talking over the assistant.
    Interrupt {},
}

/// Frames sent from the gateway to the client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A stored user or bot message.
    Message(Message),
    /// The assistant is composing a reply.
    Typing {
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
    /// A bot reply to a voice turn, carrying `shouldSpeak`.
    VoiceResponse(Message),
    /// A non-fatal processing error; the connection stays open.
    Error { message: String },
    /// Acknowledges an `interrupt` frame.
    Interrupted {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
}

/// Discriminant of a `ServerFrame`, used to route frames to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Message,
    Typing,
    VoiceResponse,
    Error,
    Interrupted,
}

impl ServerFrame {
    pub fn kind(&self) -> FrameKind {
        match self {
            ServerFrame::Message(_) => FrameKind::Message,
            ServerFrame::Typing { .. } => FrameKind::Typing,
            ServerFrame::VoiceResponse(_) => FrameKind::VoiceResponse,
            ServerFrame::Error { .. } => FrameKind::Error,
            ServerFrame::Interrupted { .. } => FrameKind::Interrupted,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
        }
    }
}

impl FrameKind {
    pub const ALL: [FrameKind; 5] = [
        FrameKind::Message,
        FrameKind::Typing,
        FrameKind::VoiceResponse,
        FrameKind::Error,
        FrameKind::Interrupted,
    ];
}
