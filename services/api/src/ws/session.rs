//! Manages the WebSocket connection lifecycle for a chat session.

use super::{
    protocol::{ClientFrame, FrameError, ServerFrame, parse_frame},
    registry::Session,
    turn::{TurnKind, TurnRequest, emit, run_turn_worker},
};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::Arc;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    watch,
};
use tracing::{Instrument, debug, error, info, instrument, warn};
use voxchat_core::{ConversationState, Message};

pub const WELCOME_MESSAGE: &str = "Hello! I'm your AI assistant. How can I help you today?";

const OUTBOUND_BUFFER: usize = 100;
const TURN_QUEUE: usize = 16;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// Registers the connection, opens its conversation and greets the client,
/// then reads frames until the socket closes. Turns run on a dedicated worker
/// so the read loop keeps answering `interrupt` while a completion is pending.
#[instrument(name = "ws_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (socket_tx, mut socket_rx) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<ServerFrame>(OUTBOUND_BUFFER);
    let writer = tokio::spawn(write_frames(socket_tx, out_rx).in_current_span());

    let session = state.registry.register(out_tx).await;
    tracing::Span::current().record("session_id", tracing::field::display(session.id));
    info!("New WebSocket connection registered.");

    let conversation = match ConversationState::open(
        session.id,
        state.completion.clone(),
        state.completion_timeout,
    )
    .await
    {
        Ok(conversation) => conversation,
        Err(e) => {
            error!(error = %e, "Failed to open conversation.");
            let _ = emit(&session, ServerFrame::error("AI service is unavailable.")).await;
            state.registry.remove(session.id).await;
            drop(session);
            let _ = writer.await;
            return;
        }
    };

    let welcome = Message::bot(session.id, WELCOME_MESSAGE);
    if emit(&session, ServerFrame::Message(welcome)).await.is_err() {
        warn!("Failed to queue welcome message.");
    }

    let (turn_tx, turn_rx) = mpsc::channel::<TurnRequest>(TURN_QUEUE);
    let (closed_tx, closed_rx) = watch::channel(false);
    let worker = tokio::spawn(
        run_turn_worker(
            state.clone(),
            session.clone(),
            conversation,
            turn_rx,
            closed_rx,
        )
        .in_current_span(),
    );

    while let Some(msg_result) = socket_rx.next().await {
        match msg_result {
            Ok(WsMessage::Text(text)) => {
                session.touch();
                if let Err(e) = route_frame(&session, &turn_tx, text.as_str()).await {
                    warn!(error = ?e, "Failed to answer client frame.");
                    break;
                }
            }
            Ok(WsMessage::Binary(_)) => {
                warn!("Received unsupported binary frame.");
                if emit(&session, ServerFrame::error("Binary frames are not supported."))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(WsMessage::Close(_)) => {
                info!("Client sent close frame.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = ?e, "Error receiving from client WebSocket.");
                break;
            }
        }
    }

    // Teardown: deregister first so the session is never reachable once closing.
    state.registry.remove(session.id).await;
    let _ = closed_tx.send(true);
    drop(turn_tx);
    if let Err(e) = worker.await {
        error!(error = ?e, "Turn worker panicked.");
    }
    drop(session);
    if let Err(e) = writer.await {
        error!(error = ?e, "Writer task panicked.");
    }
    info!("WebSocket session closed.");
}

/// Validates one text frame and either answers it directly or queues a turn.
///
/// Only a closed outbound connection is returned as an error; everything the
/// client did wrong is answered with an `error` frame.
async fn route_frame(
    session: &Session,
    turns: &mpsc::Sender<TurnRequest>,
    text: &str,
) -> Result<()> {
    let frame = match parse_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "Rejected client frame.");
            let message = match e {
                FrameError::Malformed(_) => "Invalid message format.".to_string(),
                FrameError::EmptyContent(_) => e.to_string(),
            };
            return emit(session, ServerFrame::error(message)).await;
        }
    };

    let request = match frame {
        ClientFrame::Interrupt {} => {
            session.interrupt();
            info!("Interrupt received.");
            return emit(
                session,
                ServerFrame::Interrupted {
                    session_id: session.id,
                },
            )
            .await;
        }
        ClientFrame::Message { content } => TurnRequest {
            kind: TurnKind::Text,
            text: content,
        },
        ClientFrame::VoiceMessage { transcribed_text } => TurnRequest {
            kind: TurnKind::Voice,
            text: transcribed_text,
        },
    };

    match turns.try_send(request) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => {
            warn!("Turn queue is full; rejecting message.");
            emit(
                session,
                ServerFrame::error("Too many pending messages. Please wait for a reply."),
            )
            .await
        }
        Err(TrySendError::Closed(_)) => {
            emit(session, ServerFrame::error("Failed to process message")).await
        }
    }
}

/// Drains the outbound queue into the socket, preserving order.
async fn write_frames(
    mut socket_tx: SplitSink<WebSocket, WsMessage>,
    mut frames: mpsc::Receiver<ServerFrame>,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = send_frame(&mut socket_tx, &frame).await {
            warn!(error = ?e, "Failed to write frame; stopping writer.");
            break;
        }
    }
    let _ = socket_tx.close().await;
}

/// Serializes and sends a `ServerFrame` over the WebSocket.
async fn send_frame(
    socket_tx: &mut SplitSink<WebSocket, WsMessage>,
    frame: &ServerFrame,
) -> Result<()> {
    let serialized = serde_json::to_string(frame)?;
    socket_tx.send(WsMessage::Text(serialized.into())).await?;
    Ok(())
}
