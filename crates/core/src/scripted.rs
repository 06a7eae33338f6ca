//! A scripted `CompletionClient` for development and integration testing.
//!
//! Replies are picked from keyword categories matched against the latest user
//! turn, rotating through each category by history length, so output is
//! predictable without network access or API costs.

use crate::completion::CompletionClient;
use crate::conversation::{Role, Turn};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

struct Category {
    keywords: &'static [&'static str],
    replies: &'static [&'static str],
}

const CATEGORIES: &[Category] = &[
    Category {
        keywords: &["hello", "hi", "hey", "good morning", "good afternoon"],
        replies: &[
            "Hello! What can I help you with today?",
            "Hi there! Ask me anything.",
        ],
    },
    Category {
        keywords: &["voice", "speak", "listen"],
        replies: &[
            "Switch to voice mode and tap the microphone to talk to me.",
            "I can read my answers aloud when you talk to me in voice mode.",
        ],
    },
    Category {
        keywords: &["thanks", "thank you"],
        replies: &["You're welcome!", "Happy to help."],
    },
];

const DEFAULT_REPLIES: &[&str] = &[
    "That's an interesting question. Could you tell me a bit more?",
    "I see. Let me think about that with you.",
    "Could you give me some more detail on what you're looking for?",
];

#[derive(Default)]
pub struct ScriptedCompletionClient {
    open_sessions: Mutex<HashSet<Uuid>>,
}

impl ScriptedCompletionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions opened and not yet closed.
    pub fn open_sessions(&self) -> Vec<Uuid> {
        self.open_sessions
            .lock()
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    fn reply_for(text: &str, rotation: usize) -> &'static str {
        let text = text.to_lowercase();
        let replies = CATEGORIES
            .iter()
            .find(|c| c.keywords.iter().any(|k| text.contains(k)))
            .map(|c| c.replies)
            .unwrap_or(DEFAULT_REPLIES);
        replies[rotation % replies.len()]
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn open_session(&self, session_id: Uuid) -> Result<()> {
        self.open_sessions
            .lock()
            .map_err(|_| anyhow!("session set poisoned"))?
            .insert(session_id);
        Ok(())
    }

    async fn complete(&self, session_id: Uuid, history: &[Turn]) -> Result<String> {
        let is_open = self
            .open_sessions
            .lock()
            .map_err(|_| anyhow!("session set poisoned"))?
            .contains(&session_id);
        if !is_open {
            return Err(anyhow!("Session {} not found", session_id));
        }

        let last_user = history
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .ok_or_else(|| anyhow!("No user turn to answer"))?;
        Ok(Self::reply_for(&last_user.content, history.len() / 2).to_string())
    }

    async fn close_session(&self, session_id: Uuid) -> Result<()> {
        self.open_sessions
            .lock()
            .map_err(|_| anyhow!("session set poisoned"))?
            .remove(&session_id);
        Ok(())
    }
}
