//! Speech capture: microphone to `voice_message` frame.
//!
//! `Idle -> Requesting -> Recording -> Finalizing -> Idle`, with `Error`
//! reachable from anywhere and left only through `acknowledge_error`. Every
//! attempt gets a new generation; events from older attempts are ignored.

use crate::{
    capability::RecognitionCapability,
    error::ClientError,
    recognizer::{CaptureEvent, CaptureSignal, RecognitionEvents, RecognizerEvent, SpeechRecognizer},
    transport::FrameSink,
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use voxchat_core::ClientFrame;

/// Recording is finalized automatically after this long.
pub const AUTO_STOP_AFTER: Duration = Duration::from_secs(10);

/// A finalizing capture gives up on its transcript after this long.
pub const FINALIZE_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_LANGUAGE: &str = "en-US";

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    Requesting,
    Recording,
    Finalizing,
    Error(String),
}

pub struct SpeechCapture {
    recognizer: Result<Arc<dyn SpeechRecognizer>, String>,
    language: String,
    sink: Arc<dyn FrameSink>,
    state: CaptureState,
    transitions: broadcast::Sender<CaptureState>,
    events_tx: mpsc::UnboundedSender<CaptureEvent>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl SpeechCapture {
    pub fn new(
        capability: RecognitionCapability,
        language: impl Into<String>,
        sink: Arc<dyn FrameSink>,
    ) -> (Self, mpsc::UnboundedReceiver<CaptureEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (transitions, _) = broadcast::channel(32);
        let capture = Self {
            recognizer: capability.into_recognizer(),
            language: language.into(),
            sink,
            state: CaptureState::Idle,
            transitions,
            events_tx,
            generation: 0,
            timer: None,
        };
        (capture, events_rx)
    }

    pub fn state(&self) -> CaptureState {
        self.state.clone()
    }

    /// True between `start` and the end of finalization.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            CaptureState::Requesting | CaptureState::Recording | CaptureState::Finalizing
        )
    }

    /// Every state change, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureState> {
        self.transitions.subscribe()
    }

    fn set_state(&mut self, state: CaptureState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Capture state change.");
            self.state = state.clone();
            let _ = self.transitions.send(state);
        }
    }

    fn fail(&mut self, message: String) {
        self.cancel_timer();
        self.set_state(CaptureState::Error(message));
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Delivers `signal` for the current attempt once `after` has elapsed.
    fn arm_timer(&mut self, after: Duration, signal: CaptureSignal) {
        self.cancel_timer();
        let tx = self.events_tx.clone();
        let generation = self.generation;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(CaptureEvent { generation, signal });
        }));
    }

    /// Opens the microphone and begins recording.
    pub async fn start(&mut self) -> Result<(), ClientError> {
        match &self.state {
            CaptureState::Idle => {}
            CaptureState::Error(message) => {
                return Err(ClientError::Capture(format!(
                    "previous error not acknowledged: {message}"
                )));
            }
            CaptureState::Recording => {
                debug!("Already recording.");
                return Ok(());
            }
            CaptureState::Requesting | CaptureState::Finalizing => {
                return Err(ClientError::Capture("capture in progress".to_string()));
            }
        }
        let recognizer = match &self.recognizer {
            Ok(recognizer) => recognizer.clone(),
            Err(reason) => {
                let reason = reason.clone();
                self.fail(reason.clone());
                return Err(ClientError::CapabilityUnavailable(reason));
            }
        };

        self.generation += 1;
        self.set_state(CaptureState::Requesting);
        let events = RecognitionEvents::new(self.generation, self.events_tx.clone());
        if let Err(e) = recognizer.start(&self.language, events).await {
            warn!(error = %e, "Failed to start recognition.");
            self.fail(e.to_string());
            return Err(e);
        }
        self.set_state(CaptureState::Recording);
        self.arm_timer(AUTO_STOP_AFTER, CaptureSignal::AutoStop);
        info!(generation = self.generation, "Recording started.");
        Ok(())
    }

    /// Stops recording; the transcript is delivered through `handle_event`.
    pub async fn finalize(&mut self) -> Result<(), ClientError> {
        if self.state != CaptureState::Recording {
            return Ok(());
        }
        self.set_state(CaptureState::Finalizing);
        self.arm_timer(FINALIZE_TIMEOUT, CaptureSignal::FinalizeTimeout);
        if let Ok(recognizer) = &self.recognizer {
            let recognizer = recognizer.clone();
            if let Err(e) = recognizer.stop().await {
                warn!(error = %e, "Failed to stop recognition.");
                recognizer.abort().await;
                self.fail(e.to_string());
                return Err(e);
            }
        }
        Ok(())
    }

    /// Drops the current attempt without sending anything.
    pub async fn abort(&mut self) {
        self.cancel_timer();
        if self.is_active() {
            if let Ok(recognizer) = &self.recognizer {
                recognizer.clone().abort().await;
            }
            // Late events from the aborted attempt must not be delivered.
            self.generation += 1;
            self.set_state(CaptureState::Idle);
        }
    }

    pub async fn handle_event(&mut self, event: CaptureEvent) {
        if event.generation != self.generation {
            debug!(
                generation = event.generation,
                current = self.generation,
                "Ignoring event from a previous capture."
            );
            return;
        }
        match event.signal {
            CaptureSignal::AutoStop => {
                if self.state == CaptureState::Recording {
                    info!("No end of speech within {:?}; finalizing.", AUTO_STOP_AFTER);
                    let _ = self.finalize().await;
                }
            }
            CaptureSignal::FinalizeTimeout => {
                if self.state == CaptureState::Finalizing {
                    warn!("No transcript within {:?}; giving up.", FINALIZE_TIMEOUT);
                    if let Ok(recognizer) = &self.recognizer {
                        recognizer.clone().abort().await;
                    }
                    self.generation += 1;
                    let error = ClientError::Capture("no transcript received".to_string());
                    self.fail(error.to_string());
                }
            }
            CaptureSignal::Recognizer(RecognizerEvent::Transcript(text)) => {
                if !self.is_active() {
                    return;
                }
                self.cancel_timer();
                self.set_state(CaptureState::Finalizing);
                self.deliver(text);
            }
            CaptureSignal::Recognizer(RecognizerEvent::Failed(message)) => {
                if self.is_active() {
                    if let Ok(recognizer) = &self.recognizer {
                        recognizer.clone().abort().await;
                    }
                    self.fail(ClientError::Capture(message).to_string());
                }
            }
            CaptureSignal::Recognizer(RecognizerEvent::Ended) => {
                if self.is_active() {
                    self.cancel_timer();
                    self.set_state(CaptureState::Idle);
                }
            }
        }
    }

    fn deliver(&mut self, text: String) {
        let transcript = text.trim();
        if transcript.is_empty() {
            debug!("Empty transcript; nothing to send.");
            self.set_state(CaptureState::Idle);
            return;
        }
        let frame = ClientFrame::VoiceMessage {
            transcribed_text: transcript.to_string(),
        };
        match self.sink.send(&frame) {
            Ok(()) => self.set_state(CaptureState::Idle),
            Err(e) => {
                warn!(error = %e, "Failed to send transcript.");
                self.fail(e.to_string());
            }
        }
    }

    pub fn acknowledge_error(&mut self) {
        if let CaptureState::Error(message) = &self.state {
            info!(error = %message, "Capture error acknowledged.");
            self.set_state(CaptureState::Idle);
        }
    }
}

impl Drop for SpeechCapture {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
