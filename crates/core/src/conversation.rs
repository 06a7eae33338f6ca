//! Session Conversation State
//!
//! Holds the ordered turn history of one gateway session and drives the
//! completion collaborator with it. The history only ever contains confirmed
//! exchanges: a user turn whose completion fails is rolled back.

use crate::completion::{CompletionClient, CompletionError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One utterance in a session's history. Never mutated after creation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

pub struct ConversationState {
    session_id: Uuid,
    client: Arc<dyn CompletionClient>,
    history: Vec<Turn>,
    timeout: Duration,
}

impl ConversationState {
    /// Opens the collaborator session backing `session_id`.
    pub async fn open(
        session_id: Uuid,
        client: Arc<dyn CompletionClient>,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        client
            .open_session(session_id)
            .await
            .map_err(CompletionError::Backend)?;
        info!(%session_id, "Conversation opened");
        Ok(Self {
            session_id,
            client,
            history: Vec::new(),
            timeout,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Appends a user turn, asks the collaborator for a reply with the full
    /// history, and appends the reply as an assistant turn.
    ///
    /// On any failure (backend error, empty reply, timeout) the user turn is
    /// removed again and nothing is appended.
    pub async fn complete(&mut self, text: &str) -> Result<String, CompletionError> {
        self.history.push(Turn::user(text));

        let outcome = tokio::time::timeout(
            self.timeout,
            self.client.complete(self.session_id, &self.history),
        )
        .await;

        let result = match outcome {
            Ok(Ok(reply)) if !reply.trim().is_empty() => Ok(reply),
            Ok(Ok(_)) => Err(CompletionError::EmptyResponse),
            Ok(Err(e)) => Err(CompletionError::Backend(e)),
            Err(_) => Err(CompletionError::Timeout(self.timeout)),
        };

        match result {
            Ok(reply) => {
                self.history.push(Turn::assistant(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                self.history.pop();
                warn!(session_id = %self.session_id, error = %e, "Completion failed; turn rolled back");
                Err(e)
            }
        }
    }

    /// Releases the collaborator session. Failures are logged, not returned.
    pub async fn close(self) {
        if let Err(e) = self.client.close_session(self.session_id).await {
            warn!(session_id = %self.session_id, error = ?e, "Failed to close completion session");
        } else {
            info!(session_id = %self.session_id, turns = self.history.len(), "Conversation closed");
        }
    }
}
