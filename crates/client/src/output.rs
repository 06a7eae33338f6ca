//! Speech output: at most one utterance at a time.

use crate::{capability::SynthesisCapability, error::ClientError};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    /// BCP 47 tag, e.g. `en-US`.
    pub locale: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeakOptions {
    pub locale: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    /// Skips voice selection when set.
    pub voice: Option<Voice>,
}

impl Default for SpeakOptions {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            voice: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: u64,
    pub text: String,
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisEvent {
    Finished,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputEvent {
    pub utterance: u64,
    pub event: SynthesisEvent,
}

/// Channel a synthesizer reports into, bound to one utterance.
#[derive(Debug, Clone)]
pub struct UtteranceEvents {
    utterance: u64,
    tx: mpsc::UnboundedSender<OutputEvent>,
}

impl UtteranceEvents {
    pub fn emit(&self, event: SynthesisEvent) {
        let _ = self.tx.send(OutputEvent {
            utterance: self.utterance,
            event,
        });
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait SpeechSynthesizer: Send + Sync {
    fn voices(&self) -> Vec<Voice>;
    /// Starts playing. Completion or failure is reported through `events`.
    fn speak(&self, utterance: Utterance, events: UtteranceEvents) -> Result<(), ClientError>;
    fn cancel(&self);
    fn pause(&self);
    fn resume(&self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputState {
    Idle,
    Speaking,
    Error(String),
}

fn primary_language(locale: &str) -> &str {
    locale.split(['-', '_']).next().unwrap_or(locale)
}

fn is_high_quality(voice: &Voice) -> bool {
    voice.name.contains("Natural") || voice.name.contains("Enhanced")
}

/// Prefers a high-quality voice for the locale's language, then any voice
/// for that language. `None` leaves the platform default in place.
pub fn select_voice(voices: &[Voice], locale: &str) -> Option<Voice> {
    let language = primary_language(locale);
    let mut matching = voices
        .iter()
        .filter(|v| primary_language(&v.locale).eq_ignore_ascii_case(language));
    matching
        .clone()
        .find(|v| is_high_quality(v))
        .or_else(|| matching.next())
        .cloned()
}

pub struct SpeechOutput {
    synthesizer: Result<std::sync::Arc<dyn SpeechSynthesizer>, String>,
    state: OutputState,
    transitions: broadcast::Sender<OutputState>,
    events_tx: mpsc::UnboundedSender<OutputEvent>,
    current: Option<u64>,
    next_utterance: u64,
}

impl SpeechOutput {
    pub fn new(capability: SynthesisCapability) -> (Self, mpsc::UnboundedReceiver<OutputEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (transitions, _) = broadcast::channel(32);
        let synthesizer = match capability {
            SynthesisCapability::Available(synthesizer) => Ok(synthesizer),
            SynthesisCapability::Unavailable(reason) => Err(reason),
        };
        let output = Self {
            synthesizer,
            state: OutputState::Idle,
            transitions,
            events_tx,
            current: None,
            next_utterance: 0,
        };
        (output, events_rx)
    }

    pub fn state(&self) -> OutputState {
        self.state.clone()
    }

    pub fn is_speaking(&self) -> bool {
        self.state == OutputState::Speaking
    }

    /// Every state change, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<OutputState> {
        self.transitions.subscribe()
    }

    fn set_state(&mut self, state: OutputState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Output state change.");
            self.state = state.clone();
            let _ = self.transitions.send(state);
        }
    }

    /// Speaks `text`, cancelling whatever is playing first.
    pub fn speak(&mut self, text: &str, options: &SpeakOptions) -> Result<(), ClientError> {
        let synthesizer = match &self.synthesizer {
            Ok(synthesizer) => synthesizer.clone(),
            Err(reason) => {
                let reason = reason.clone();
                self.set_state(OutputState::Error(reason.clone()));
                return Err(ClientError::CapabilityUnavailable(reason));
            }
        };
        if text.trim().is_empty() {
            return Ok(());
        }

        self.stop();

        self.next_utterance += 1;
        let id = self.next_utterance;
        let voice = options
            .voice
            .clone()
            .or_else(|| select_voice(&synthesizer.voices(), &options.locale));
        let utterance = Utterance {
            id,
            text: text.to_string(),
            voice,
            rate: options.rate,
            pitch: options.pitch,
            volume: options.volume,
        };
        let events = UtteranceEvents {
            utterance: id,
            tx: self.events_tx.clone(),
        };

        if let Err(e) = synthesizer.speak(utterance, events) {
            warn!(error = %e, "Failed to start utterance.");
            self.set_state(OutputState::Error(e.to_string()));
            return Err(e);
        }
        self.current = Some(id);
        self.set_state(OutputState::Speaking);
        Ok(())
    }

    /// Cancels the active utterance, if any.
    pub fn stop(&mut self) {
        if self.current.take().is_some() {
            if let Ok(synthesizer) = &self.synthesizer {
                synthesizer.cancel();
            }
            self.set_state(OutputState::Idle);
        }
    }

    pub fn pause(&self) {
        if let (OutputState::Speaking, Ok(synthesizer)) = (&self.state, &self.synthesizer) {
            synthesizer.pause();
        }
    }

    pub fn resume(&self) {
        if let (OutputState::Speaking, Ok(synthesizer)) = (&self.state, &self.synthesizer) {
            synthesizer.resume();
        }
    }

    pub fn handle_event(&mut self, event: OutputEvent) {
        if self.current != Some(event.utterance) {
            debug!(utterance = event.utterance, "Ignoring event from a cancelled utterance.");
            return;
        }
        self.current = None;
        match event.event {
            SynthesisEvent::Finished => self.set_state(OutputState::Idle),
            SynthesisEvent::Failed(message) => {
                warn!(error = %message, "Playback failed.");
                let error = ClientError::Playback(message);
                self.set_state(OutputState::Error(error.to_string()));
            }
        }
    }

    pub fn acknowledge_error(&mut self) {
        if let OutputState::Error(message) = &self.state {
            info!(error = %message, "Output error acknowledged.");
            self.set_state(OutputState::Idle);
        }
    }
}
