//! Shared building blocks for the voice chat gateway and its client:
//! the frame protocol, message records, per-session conversation state, and
//! the AI completion collaborator.

pub mod completion;
pub mod conversation;
pub mod message;
pub mod protocol;
pub mod scripted;

pub use completion::{CompletionClient, CompletionError, OpenAICompatibleClient};
pub use conversation::{ConversationState, Role, Turn};
pub use message::{Message, NewMessage, Sender};
pub use protocol::{ClientFrame, FrameKind, ServerFrame};
pub use scripted::ScriptedCompletionClient;
