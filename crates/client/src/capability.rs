//! One-time negotiation of what speech features the platform offers.

use crate::{
    output::SpeechSynthesizer,
    recognizer::{
        AudioInput, BufferedRecognizer, ContinuousRecognizer, RecognitionService,
        SpeechRecognizer, Transcriber,
    },
};
use std::sync::Arc;
use tracing::info;

pub const RECOGNITION_UNAVAILABLE: &str =
    "Speech recognition is not supported on this platform.";
pub const SYNTHESIS_UNAVAILABLE: &str = "Text-to-speech not supported";

/// The speech backends a platform exposes. Every accessor may come back empty.
pub trait SpeechPlatform: Send + Sync {
    fn recognition_service(&self) -> Option<Arc<dyn RecognitionService>>;
    fn audio_input(&self) -> Option<Arc<dyn AudioInput>>;
    fn transcriber(&self) -> Option<Arc<dyn Transcriber>>;
    fn synthesizer(&self) -> Option<Arc<dyn SpeechSynthesizer>>;
}

pub enum RecognitionCapability {
    Continuous(Arc<dyn RecognitionService>),
    Buffered {
        input: Arc<dyn AudioInput>,
        transcriber: Arc<dyn Transcriber>,
    },
    Unavailable(String),
}

impl RecognitionCapability {
    /// Builds the recognizer for this strategy, or the reason there is none.
    pub fn into_recognizer(self) -> Result<Arc<dyn SpeechRecognizer>, String> {
        match self {
            RecognitionCapability::Continuous(service) => {
                Ok(Arc::new(ContinuousRecognizer::new(service)))
            }
            RecognitionCapability::Buffered { input, transcriber } => {
                Ok(Arc::new(BufferedRecognizer::new(input, transcriber)))
            }
            RecognitionCapability::Unavailable(reason) => Err(reason),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RecognitionCapability::Continuous(_) => "continuous",
            RecognitionCapability::Buffered { .. } => "buffered",
            RecognitionCapability::Unavailable(_) => "unavailable",
        }
    }
}

pub enum SynthesisCapability {
    Available(Arc<dyn SpeechSynthesizer>),
    Unavailable(String),
}

pub struct Capabilities {
    pub recognition: RecognitionCapability,
    pub synthesis: SynthesisCapability,
}

/// Picks the recognition strategy and synthesis backend once at startup.
///
/// A continuous recognition service wins over buffered capture, which needs
/// both an audio input and an offline transcriber.
pub fn probe(platform: &dyn SpeechPlatform) -> Capabilities {
    let recognition = match (
        platform.recognition_service(),
        platform.audio_input(),
        platform.transcriber(),
    ) {
        (Some(service), _, _) => RecognitionCapability::Continuous(service),
        (None, Some(input), Some(transcriber)) => {
            RecognitionCapability::Buffered { input, transcriber }
        }
        _ => RecognitionCapability::Unavailable(RECOGNITION_UNAVAILABLE.to_string()),
    };
    let synthesis = match platform.synthesizer() {
        Some(synthesizer) => SynthesisCapability::Available(synthesizer),
        None => SynthesisCapability::Unavailable(SYNTHESIS_UNAVAILABLE.to_string()),
    };
    info!(
        recognition = recognition.name(),
        synthesis = matches!(synthesis, SynthesisCapability::Available(_)),
        "Speech capabilities probed."
    );
    Capabilities {
        recognition,
        synthesis,
    }
}
