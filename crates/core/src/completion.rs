use crate::conversation::{Role, Turn};
use anyhow::{Context, Result, bail};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Failure of the AI completion collaborator for a single turn.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("AI backend error: {0:#}")]
    Backend(anyhow::Error),
    #[error("AI backend did not answer within {0:?}")]
    Timeout(Duration),
    #[error("AI backend returned an empty response")]
    EmptyResponse,
}

/// The opaque text-completion backend.
///
/// Per-session conversation state lives with the caller; a client only sees
/// the accumulated history on every call. `open_session` and `close_session`
/// let a backend hold per-session resources of its own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn open_session(&self, session_id: Uuid) -> Result<()>;

    /// Produces the assistant reply to the last user turn in `history`.
    async fn complete(&self, session_id: Uuid, history: &[Turn]) -> Result<String>;

    async fn close_session(&self, session_id: Uuid) -> Result<()>;
}

/// An implementation of `CompletionClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
    system_prompt: String,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model identifier to use for chat completions (e.g., "gemini-1.5-flash").
    /// * `system_prompt` - Instructions prepended to every request.
    pub fn new(config: OpenAIConfig, model: String, system_prompt: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            system_prompt,
        }
    }

    fn build_messages(&self, history: &[Turn]) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.system_prompt.clone())
                .build()?
                .into(),
        ];
        for turn in history {
            match turn.role {
                Role::User => messages.push(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(turn.content.clone())
                        .build()?
                        .into(),
                ),
                Role::Assistant => messages.push(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(turn.content.clone())
                        .build()?
                        .into(),
                ),
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl CompletionClient for OpenAICompatibleClient {
    async fn open_session(&self, session_id: Uuid) -> Result<()> {
        debug!(%session_id, model = %self.model, "Completion session opened");
        Ok(())
    }

    async fn complete(&self, session_id: Uuid, history: &[Turn]) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.build_messages(history)?)
            .build()?;

        let response: CreateChatCompletionResponse = self.client.chat().create(request).await?;

        let answer = response
            .choices
            .first()
            .context("No response choice from LLM")?
            .message
            .content
            .clone()
            .context("No content in LLM response")?;
        if answer.trim().is_empty() {
            bail!("LLM response content was empty");
        }

        debug!(%session_id, turns = history.len(), "Completion received");
        Ok(answer)
    }

    async fn close_session(&self, session_id: Uuid) -> Result<()> {
        debug!(%session_id, "Completion session closed");
        Ok(())
    }
}
