//! Text/voice mode switching and the client's view of the conversation.
//!
//! The controller owns the capture and output state machines and keeps them
//! mutually exclusive. Switching modes never touches the transport.

use crate::{
    capability::Capabilities,
    capture::{CaptureState, SpeechCapture},
    error::ClientError,
    output::{OutputEvent, OutputState, SpeakOptions, SpeechOutput},
    recognizer::CaptureEvent,
    transport::FrameSink,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use voxchat_core::{ClientFrame, Message, Sender, ServerFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Text,
    Voice,
}

/// User intents fed to [`ModeController::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SendText(String),
    SetMode(Mode),
    ToggleMode,
    StartCapture,
    StopCapture,
    AcknowledgeError,
}

/// Receivers for the asynchronous results of capture and output.
pub struct ControllerEvents {
    pub capture: mpsc::UnboundedReceiver<CaptureEvent>,
    pub output: mpsc::UnboundedReceiver<OutputEvent>,
}

pub struct ModeController {
    mode: Mode,
    sink: Arc<dyn FrameSink>,
    capture: SpeechCapture,
    output: SpeechOutput,
    speak_options: SpeakOptions,
    messages: Vec<Message>,
    is_typing: bool,
    last_error: Option<String>,
    last_bot_text: Option<String>,
}

impl ModeController {
    pub fn new(
        sink: Arc<dyn FrameSink>,
        capabilities: Capabilities,
        speak_options: SpeakOptions,
    ) -> (Self, ControllerEvents) {
        let (capture, capture_events) = SpeechCapture::new(
            capabilities.recognition,
            speak_options.locale.clone(),
            sink.clone(),
        );
        let (output, output_events) = SpeechOutput::new(capabilities.synthesis);
        let controller = Self {
            mode: Mode::Text,
            sink,
            capture,
            output,
            speak_options,
            messages: Vec::new(),
            is_typing: false,
            last_error: None,
            last_bot_text: None,
        };
        let events = ControllerEvents {
            capture: capture_events,
            output: output_events,
        };
        (controller, events)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_typing(&self) -> bool {
        self.is_typing
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_bot_text(&self) -> Option<&str> {
        self.last_bot_text.as_deref()
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    pub fn output_state(&self) -> OutputState {
        self.output.state()
    }

    /// Stop output, then tell the server.
    fn barge_in(&mut self) {
        self.output.stop();
        if let Err(e) = self.sink.send(&ClientFrame::Interrupt {}) {
            warn!(error = %e, "Failed to send interrupt.");
        }
    }

    pub async fn set_mode(&mut self, mode: Mode) {
        if self.mode == mode {
            return;
        }
        match mode {
            Mode::Voice => {
                if self.output.is_speaking() {
                    self.barge_in();
                }
            }
            Mode::Text => {
                self.capture.abort().await;
                self.output.stop();
            }
        }
        info!(?mode, "Mode changed.");
        self.mode = mode;
    }

    pub async fn toggle_mode(&mut self) {
        let next = match self.mode {
            Mode::Text => Mode::Voice,
            Mode::Voice => Mode::Text,
        };
        self.set_mode(next).await;
    }

    pub fn send_text(&mut self, content: &str) -> Result<(), ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(());
        }
        let frame = ClientFrame::Message {
            content: content.to_string(),
        };
        if let Err(e) = self.sink.send(&frame) {
            self.last_error = Some(e.to_string());
            return Err(e);
        }
        Ok(())
    }

    /// Starts recording, interrupting any reply that is being spoken.
    pub async fn start_capture(&mut self) -> Result<(), ClientError> {
        if self.mode != Mode::Voice {
            return Err(ClientError::Capture("voice mode is not active".to_string()));
        }
        if self.output.is_speaking() {
            self.barge_in();
        }
        if let Err(e) = self.capture.start().await {
            self.last_error = Some(e.to_string());
            return Err(e);
        }
        Ok(())
    }

    pub async fn stop_capture(&mut self) -> Result<(), ClientError> {
        self.capture.finalize().await
    }

    pub fn acknowledge_error(&mut self) {
        self.last_error = None;
        self.capture.acknowledge_error();
        self.output.acknowledge_error();
    }

    fn record(&mut self, message: Message) {
        if message.sender == Sender::Bot {
            self.last_bot_text = Some(message.content.clone());
        }
        self.messages.push(message);
    }

    pub async fn handle_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::Message(message) => self.record(message),
            ServerFrame::Typing { is_typing } => self.is_typing = is_typing,
            ServerFrame::VoiceResponse(message) => {
                self.is_typing = false;
                let text = message.content.clone();
                let should_speak = message.should_speak == Some(true);
                self.record(message);
                if should_speak && self.mode == Mode::Voice {
                    if self.capture.is_active() {
                        self.capture.abort().await;
                    }
                    if let Err(e) = self.output.speak(&text, &self.speak_options) {
                        self.last_error = Some(e.to_string());
                    }
                }
            }
            ServerFrame::Error { message } => {
                warn!(error = %message, "Server reported an error.");
                self.is_typing = false;
                self.last_error = Some(message);
            }
            ServerFrame::Interrupted { session_id } => {
                debug!(%session_id, "Server acknowledged interrupt.");
            }
        }
    }

    pub async fn handle_capture_event(&mut self, event: CaptureEvent) {
        self.capture.handle_event(event).await;
        if let CaptureState::Error(message) = self.capture.state() {
            self.last_error = Some(message);
        }
    }

    pub fn handle_output_event(&mut self, event: OutputEvent) {
        self.output.handle_event(event);
        if let OutputState::Error(message) = self.output.state() {
            self.last_error = Some(message);
        }
    }

    async fn handle_command(&mut self, command: Command) {
        let result = match command {
            Command::SendText(content) => self.send_text(&content),
            Command::SetMode(mode) => {
                self.set_mode(mode).await;
                Ok(())
            }
            Command::ToggleMode => {
                self.toggle_mode().await;
                Ok(())
            }
            Command::StartCapture => self.start_capture().await,
            Command::StopCapture => self.stop_capture().await,
            Command::AcknowledgeError => {
                self.acknowledge_error();
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "Command failed.");
        }
    }

    /// Drives the controller until the command channel closes, then releases
    /// the microphone and speaker and hands the controller back.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut frames: mpsc::UnboundedReceiver<ServerFrame>,
        mut events: ControllerEvents,
    ) -> Self {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(frame) = frames.recv() => self.handle_frame(frame).await,
                Some(event) = events.capture.recv() => self.handle_capture_event(event).await,
                Some(event) = events.output.recv() => self.handle_output_event(event),
            }
        }
        self.capture.abort().await;
        self.output.stop();
        self
    }
}
