//! The client's single long-lived connection to the chat gateway.
//!
//! A supervisor task owns the socket. When the connection drops it waits a
//! fixed delay and dials again, until `disconnect` is called. Inbound frames
//! are decoded and fanned out to per-kind subscribers; outbound frames are
//! written immediately or rejected, never queued across reconnects.

use crate::error::ClientError;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use tracing::{debug, info, warn};
use voxchat_core::{ClientFrame, FrameKind, ServerFrame};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Gateway endpoint, e.g. `ws://localhost:3000/ws`.
    pub url: String,
    pub reconnect_delay: Duration,
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Anything the client can push frames through.
pub trait FrameSink: Send + Sync {
    fn send(&self, frame: &ClientFrame) -> Result<(), ClientError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The live writer, tagged with the supervisor generation that owns it.
#[derive(Default)]
struct Link {
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<WsMessage>>,
}

struct Shared {
    state: watch::Sender<TransportState>,
    link: Mutex<Link>,
    subscribers: Mutex<HashMap<FrameKind, Vec<mpsc::UnboundedSender<ServerFrame>>>>,
}

impl Shared {
    /// Applies a transition on behalf of supervisor `generation`. Returns
    /// false, changing nothing, once that supervisor has been superseded.
    fn transition(
        &self,
        generation: u64,
        state: TransportState,
        outbound: Option<mpsc::UnboundedSender<WsMessage>>,
    ) -> bool {
        let mut link = lock(&self.link);
        if link.generation != generation {
            return false;
        }
        link.outbound = outbound;
        self.state.send_replace(state);
        true
    }

    /// Invalidates the current supervisor and moves to `state`.
    fn retire(&self, state: TransportState) -> u64 {
        let mut link = lock(&self.link);
        link.generation += 1;
        link.outbound = None;
        self.state.send_replace(state);
        link.generation
    }

    fn dispatch(&self, text: &str) {
        let frame: ServerFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Dropping malformed frame from server.");
                return;
            }
        };
        let mut subscribers = lock(&self.subscribers);
        if let Some(list) = subscribers.get_mut(&frame.kind()) {
            list.retain(|tx| tx.send(frame.clone()).is_ok());
        }
    }
}

pub struct Transport {
    config: TransportConfig,
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Self {
        let (state, _) = watch::channel(TransportState::Disconnected);
        Self {
            config,
            shared: Arc::new(Shared {
                state,
                link: Mutex::new(Link::default()),
                subscribers: Mutex::new(HashMap::new()),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// Starts connecting in the background. Any previous connection and its
    /// pending reconnect are cancelled first.
    pub fn connect(&self) {
        let mut supervisor = lock(&self.supervisor);
        if let Some(previous) = supervisor.take() {
            previous.abort();
        }
        let generation = self.shared.retire(TransportState::Connecting);
        *supervisor = Some(tokio::spawn(supervise(
            self.config.clone(),
            self.shared.clone(),
            generation,
        )));
    }

    /// Closes the connection and cancels any scheduled reconnect.
    pub fn disconnect(&self) {
        if let Some(supervisor) = lock(&self.supervisor).take() {
            supervisor.abort();
        }
        self.shared.retire(TransportState::Disconnected);
        info!("Transport disconnected by caller.");
    }

    pub fn state(&self) -> TransportState {
        *self.shared.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<TransportState> {
        self.shared.state.subscribe()
    }

    /// Receives every inbound frame whose type is one of `kinds`.
    pub fn subscribe(&self, kinds: &[FrameKind]) -> mpsc::UnboundedReceiver<ServerFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = lock(&self.shared.subscribers);
        for kind in kinds {
            subscribers.entry(*kind).or_default().push(tx.clone());
        }
        rx
    }

    /// Writes a frame on the live connection, or fails at once when there is none.
    pub fn send(&self, frame: &ClientFrame) -> Result<(), ClientError> {
        if self.state() != TransportState::Connected {
            return Err(ClientError::NotConnected);
        }
        let text = serde_json::to_string(frame)?;
        match lock(&self.shared.link).outbound.as_ref() {
            Some(tx) => tx
                .send(WsMessage::Text(text.into()))
                .map_err(|_| ClientError::NotConnected),
            None => Err(ClientError::NotConnected),
        }
    }
}

impl FrameSink for Transport {
    fn send(&self, frame: &ClientFrame) -> Result<(), ClientError> {
        Transport::send(self, frame)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(supervisor) = lock(&self.supervisor).take() {
            supervisor.abort();
        }
    }
}

async fn open_connection(url: &str) -> Result<WsStream, ClientError> {
    let (stream, _) = connect_async(url).await?;
    Ok(stream)
}

/// Connect, serve, wait, repeat. The only place a reconnect delay exists.
async fn supervise(config: TransportConfig, shared: Arc<Shared>, generation: u64) {
    loop {
        if !shared.transition(generation, TransportState::Connecting, None) {
            return;
        }
        match open_connection(&config.url).await {
            Ok(stream) => {
                info!(url = %config.url, "Connected to chat gateway.");
                run_connection(stream, &shared, generation).await;
            }
            Err(e) => warn!(url = %config.url, error = %e, "Connection attempt failed."),
        }
        if !shared.transition(generation, TransportState::Disconnected, None) {
            return;
        }
        debug!(delay = ?config.reconnect_delay, "Scheduling reconnect.");
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

async fn run_connection(stream: WsStream, shared: &Shared, generation: u64) {
    let (mut sink, mut source) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    if !shared.transition(generation, TransportState::Connected, Some(tx)) {
        debug!("Connection superseded before it went live.");
        let _ = sink.close().await;
        return;
    }

    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(message) => {
                    if let Err(e) = sink.send(message).await {
                        warn!(error = %e, "Failed to write frame.");
                        break;
                    }
                }
                None => break,
            },
            incoming = source.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => shared.dispatch(text.as_str()),
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Server closed the connection.");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Connection error.");
                    break;
                }
            },
        }
    }
}
