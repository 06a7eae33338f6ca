//! Runs a single user turn: persist, echo, complete, persist, reply.

use super::{protocol::ServerFrame, registry::Session};
use crate::state::AppState;
use anyhow::{Result, anyhow};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use voxchat_core::{ConversationState, Message, NewMessage, Sender};

/// Reply shown when the completion collaborator fails. Never persisted.
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I'm having trouble responding right now. Please try again in a moment.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    Text,
    Voice,
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub kind: TurnKind,
    pub text: String,
}

/// Processes queued turns for one session, strictly one at a time.
///
/// When `closed` fires the worker stops at once: the turn in flight is
/// dropped, queued turns are discarded and the conversation is released.
pub async fn run_turn_worker(
    state: Arc<AppState>,
    session: Arc<Session>,
    mut conversation: ConversationState,
    mut turns: mpsc::Receiver<TurnRequest>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        let request = tokio::select! {
            biased;
            _ = closed.changed() => break,
            request = turns.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };
        tokio::select! {
            biased;
            _ = closed.changed() => {
                info!("Connection closed mid-turn; abandoning it");
                break;
            }
            result = handle_turn(&state, &session, &mut conversation, request) => {
                if let Err(e) = result {
                    error!(error = ?e, "Turn processing failed");
                    let _ = emit(&session, ServerFrame::error("Failed to process message")).await;
                }
            }
        }
    }
    turns.close();
    let discarded = std::iter::from_fn(|| turns.try_recv().ok()).count();
    if discarded > 0 {
        info!(discarded, "Dropped queued turns for closed connection");
    }
    conversation.close().await;
}

/// Handles a single user interaction.
///
/// The stored user message is always emitted before the bot reply. When the
/// completion fails, an `error` frame and a non-persisted fallback reply are
/// sent instead, and the conversation history is left untouched.
pub async fn handle_turn(
    state: &AppState,
    session: &Session,
    conversation: &mut ConversationState,
    request: TurnRequest,
) -> Result<()> {
    if session.begin_turn() {
        info!("Interrupt flag cleared by new turn");
    }

    let user_message = state
        .store
        .create_message(NewMessage {
            session_id: session.id,
            sender: Sender::User,
            content: request.text.clone(),
        })
        .await?;
    emit(session, ServerFrame::Message(user_message)).await?;
    emit(session, ServerFrame::Typing { is_typing: true }).await?;

    let outcome = conversation.complete(&request.text).await;
    emit(session, ServerFrame::Typing { is_typing: false }).await?;

    match outcome {
        Ok(reply) => {
            if session.is_interrupted() {
                info!("Reply completed after an interrupt; delivering it");
            }
            let bot_message = state
                .store
                .create_message(NewMessage {
                    session_id: session.id,
                    sender: Sender::Bot,
                    content: reply,
                })
                .await?;
            emit(session, reply_frame(request.kind, bot_message)).await?;
        }
        Err(e) => {
            warn!(error = %e, kind = ?request.kind, "Completion failed; sending fallback reply");
            emit(
                session,
                ServerFrame::error("Failed to generate a response. Please try again."),
            )
            .await?;
            let fallback = Message::bot(session.id, FALLBACK_REPLY);
            emit(session, reply_frame(request.kind, fallback)).await?;
        }
    }
    Ok(())
}

fn reply_frame(kind: TurnKind, message: Message) -> ServerFrame {
    match kind {
        TurnKind::Text => ServerFrame::Message(message),
        TurnKind::Voice => ServerFrame::VoiceResponse(message.speaking()),
    }
}

/// Queues a frame on the session's connection.
pub(crate) async fn emit(session: &Session, frame: ServerFrame) -> Result<()> {
    session
        .connection()
        .send(frame)
        .await
        .map_err(|_| anyhow!("connection for session {} is closed", session.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryMessageStore, MessageStore};
    use async_trait::async_trait;
    use std::time::Duration;
    use uuid::Uuid;
    use voxchat_core::{CompletionClient, ScriptedCompletionClient, Turn};

    struct FailingClient;

    #[async_trait]
    impl CompletionClient for FailingClient {
        async fn open_session(&self, _session_id: Uuid) -> anyhow::Result<()> {
            Ok(())
        }

        async fn complete(&self, _session_id: Uuid, _history: &[Turn]) -> anyhow::Result<String> {
            Err(anyhow!("backend down"))
        }

        async fn close_session(&self, _session_id: Uuid) -> anyhow::Result<()> {
            Ok(())
        }
    }

    async fn setup(
        completion: Arc<dyn CompletionClient>,
    ) -> (
        AppState,
        Arc<InMemoryMessageStore>,
        Arc<Session>,
        ConversationState,
        mpsc::Receiver<ServerFrame>,
    ) {
        let store = Arc::new(InMemoryMessageStore::new());
        let state = AppState::new(store.clone(), completion.clone(), Duration::from_secs(5));
        let (tx, rx) = mpsc::channel(32);
        let session = state.registry.register(tx).await;
        let conversation = ConversationState::open(session.id, completion, Duration::from_secs(5))
            .await
            .unwrap();
        (state, store, session, conversation, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerFrame>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn test_text_turn_emits_user_then_bot() {
        let (state, store, session, mut conversation, mut rx) =
            setup(Arc::new(ScriptedCompletionClient::new())).await;

        handle_turn(
            &state,
            &session,
            &mut conversation,
            TurnRequest {
                kind: TurnKind::Text,
                text: "hello".to_string(),
            },
        )
        .await
        .unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 4);
        match &frames[0] {
            ServerFrame::Message(m) => {
                assert_eq!(m.sender, Sender::User);
                assert_eq!(m.content, "hello");
            }
            other => panic!("expected user message, got {:?}", other),
        }
        assert_eq!(frames[1], ServerFrame::Typing { is_typing: true });
        assert_eq!(frames[2], ServerFrame::Typing { is_typing: false });
        match &frames[3] {
            ServerFrame::Message(m) => {
                assert_eq!(m.sender, Sender::Bot);
                assert!(!m.content.is_empty());
                assert_eq!(m.should_speak, None);
            }
            other => panic!("expected bot message, got {:?}", other),
        }

        let stored = store.messages_for_session(session.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(conversation.history().len(), 2);
    }

    #[tokio::test]
    async fn test_voice_turn_replies_with_voice_response() {
        let (state, _store, session, mut conversation, mut rx) =
            setup(Arc::new(ScriptedCompletionClient::new())).await;

        handle_turn(
            &state,
            &session,
            &mut conversation,
            TurnRequest {
                kind: TurnKind::Voice,
                text: "can you speak".to_string(),
            },
        )
        .await
        .unwrap();

        let frames = drain(&mut rx);
        match frames.last() {
            Some(ServerFrame::VoiceResponse(m)) => {
                assert_eq!(m.sender, Sender::Bot);
                assert_eq!(m.should_speak, Some(true));
            }
            other => panic!("expected voice response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_completion_sends_error_and_unpersisted_fallback() {
        let (state, store, session, mut conversation, mut rx) =
            setup(Arc::new(FailingClient)).await;

        handle_turn(
            &state,
            &session,
            &mut conversation,
            TurnRequest {
                kind: TurnKind::Text,
                text: "hello".to_string(),
            },
        )
        .await
        .unwrap();

        let frames = drain(&mut rx);
        assert!(matches!(frames[3], ServerFrame::Error { .. }));
        match &frames[4] {
            ServerFrame::Message(m) => {
                assert_eq!(m.sender, Sender::Bot);
                assert_eq!(m.content, FALLBACK_REPLY);
            }
            other => panic!("expected fallback message, got {:?}", other),
        }

        let stored = store.messages_for_session(session.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sender, Sender::User);
        assert!(conversation.history().is_empty());
    }

    #[tokio::test]
    async fn test_new_turn_clears_interrupt() {
        let (state, _store, session, mut conversation, _rx) =
            setup(Arc::new(ScriptedCompletionClient::new())).await;
        session.interrupt();

        handle_turn(
            &state,
            &session,
            &mut conversation,
            TurnRequest {
                kind: TurnKind::Text,
                text: "hi".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(!session.is_interrupted());
    }
}
