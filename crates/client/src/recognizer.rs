//! Speech recognizers behind a single start/stop/abort contract.
//!
//! Two strategies exist. [`ContinuousRecognizer`] drives a platform
//! recognition service that streams results itself. [`BufferedRecognizer`]
//! records raw PCM from an audio input and runs an offline transcriber once
//! the recording is finalized. Either one reports back through
//! [`RecognitionEvents`].

use crate::{
    audio::{self, TRANSCRIBER_SAMPLE_RATE},
    error::ClientError,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{debug, warn};

/// What a recognizer reports while a capture is running.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// The final transcript of the utterance.
    Transcript(String),
    Failed(String),
    /// The recognizer released the microphone.
    Ended,
}

/// An event tagged with the capture attempt that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureEvent {
    pub generation: u64,
    pub signal: CaptureSignal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureSignal {
    Recognizer(RecognizerEvent),
    /// The capture's recording window elapsed.
    AutoStop,
    /// A stopped recognizer produced no result in time.
    FinalizeTimeout,
}

/// Channel a recognizer reports into, bound to one capture attempt.
#[derive(Debug, Clone)]
pub struct RecognitionEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<CaptureEvent>,
}

impl RecognitionEvents {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<CaptureEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn emit(&self, event: RecognizerEvent) {
        let _ = self.tx.send(CaptureEvent {
            generation: self.generation,
            signal: CaptureSignal::Recognizer(event),
        });
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Opens the microphone. Returns once permission is granted and audio flows.
    async fn start(&self, language: &str, events: RecognitionEvents) -> Result<(), ClientError>;
    /// Ends the recording; the transcript follows as a [`RecognizerEvent`].
    async fn stop(&self) -> Result<(), ClientError>;
    /// Releases the microphone without producing a transcript.
    async fn abort(&self);
}

// ---- Continuous recognition service ----

/// Raw events of a platform recognition service.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    Interim(String),
    Final(String),
    /// Platform error code, e.g. `not-allowed` or `no-speech`.
    Error(String),
    End,
}

#[async_trait]
pub trait RecognitionService: Send + Sync {
    async fn start(
        &self,
        language: &str,
        events: mpsc::UnboundedSender<ServiceEvent>,
    ) -> Result<(), ClientError>;
    async fn stop(&self);
    async fn abort(&self);
}

pub struct ContinuousRecognizer {
    service: Arc<dyn RecognitionService>,
    relay: Mutex<Option<JoinHandle<()>>>,
}

impl ContinuousRecognizer {
    pub fn new(service: Arc<dyn RecognitionService>) -> Self {
        Self {
            service,
            relay: Mutex::new(None),
        }
    }
}

fn describe_service_error(code: &str) -> String {
    match code {
        "not-allowed" | "service-not-allowed" => {
            "Microphone permission denied. Please allow microphone access.".to_string()
        }
        "audio-capture" => "No microphone was found.".to_string(),
        "network" => "Recognition service is unreachable.".to_string(),
        other => format!("{}. Please try again.", other),
    }
}

/// Collects final segments and forwards the joined transcript on `End`.
async fn relay_service_events(
    mut service_events: mpsc::UnboundedReceiver<ServiceEvent>,
    events: RecognitionEvents,
) {
    let mut segments: Vec<String> = Vec::new();
    while let Some(event) = service_events.recv().await {
        match event {
            ServiceEvent::Interim(_) => {}
            ServiceEvent::Final(text) => segments.push(text.trim().to_string()),
            // Silence and caller aborts end the capture without a transcript.
            ServiceEvent::Error(code) if code == "no-speech" || code == "aborted" => {
                debug!(code = %code, "Recognition ended without speech.");
            }
            ServiceEvent::Error(code) => {
                events.emit(RecognizerEvent::Failed(describe_service_error(&code)));
                return;
            }
            ServiceEvent::End => break,
        }
    }
    let transcript = segments.join(" ");
    if !transcript.trim().is_empty() {
        events.emit(RecognizerEvent::Transcript(transcript));
    }
    events.emit(RecognizerEvent::Ended);
}

#[async_trait]
impl SpeechRecognizer for ContinuousRecognizer {
    async fn start(&self, language: &str, events: RecognitionEvents) -> Result<(), ClientError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.service.start(language, tx).await?;
        let mut relay = self.relay.lock().await;
        if let Some(previous) = relay.take() {
            previous.abort();
        }
        *relay = Some(tokio::spawn(relay_service_events(rx, events)));
        Ok(())
    }

    async fn stop(&self) -> Result<(), ClientError> {
        self.service.stop().await;
        Ok(())
    }

    async fn abort(&self) {
        if let Some(relay) = self.relay.lock().await.take() {
            relay.abort();
        }
        self.service.abort().await;
    }
}

// ---- Buffered capture plus offline transcription ----

/// An open microphone delivering mono PCM16 chunks.
pub struct AudioStream {
    pub sample_rate: u32,
    pub chunks: mpsc::Receiver<Vec<i16>>,
}

#[async_trait]
pub trait AudioInput: Send + Sync {
    async fn open(&self) -> Result<AudioStream, ClientError>;
    /// Releases the microphone; the chunk channel closes afterwards.
    async fn close(&self);
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes mono samples at [`TRANSCRIBER_SAMPLE_RATE`].
    async fn transcribe(&self, samples: &[f32], language: &str) -> anyhow::Result<String>;
}

struct Recording {
    sample_rate: u32,
    language: String,
    events: RecognitionEvents,
    collector: JoinHandle<Vec<i16>>,
}

pub struct BufferedRecognizer {
    input: Arc<dyn AudioInput>,
    transcriber: Arc<dyn Transcriber>,
    recording: Mutex<Option<Recording>>,
}

impl BufferedRecognizer {
    pub fn new(input: Arc<dyn AudioInput>, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            input,
            transcriber,
            recording: Mutex::new(None),
        }
    }
}

async fn collect_chunks(mut chunks: mpsc::Receiver<Vec<i16>>) -> Vec<i16> {
    let mut samples = Vec::new();
    while let Some(chunk) = chunks.recv().await {
        samples.extend_from_slice(&chunk);
    }
    samples
}

async fn transcribe_recording(
    transcriber: Arc<dyn Transcriber>,
    samples: Vec<i16>,
    sample_rate: u32,
    language: String,
) -> anyhow::Result<String> {
    let pcm = audio::convert_i16_to_f32(&samples);
    let resampled = audio::resample(&pcm, sample_rate as f64, TRANSCRIBER_SAMPLE_RATE)?;
    transcriber.transcribe(&resampled, &language).await
}

#[async_trait]
impl SpeechRecognizer for BufferedRecognizer {
    async fn start(&self, language: &str, events: RecognitionEvents) -> Result<(), ClientError> {
        let stream = self.input.open().await?;
        let mut recording = self.recording.lock().await;
        if let Some(previous) = recording.take() {
            previous.collector.abort();
        }
        *recording = Some(Recording {
            sample_rate: stream.sample_rate,
            language: language.to_string(),
            events,
            collector: tokio::spawn(collect_chunks(stream.chunks)),
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), ClientError> {
        let Some(recording) = self.recording.lock().await.take() else {
            return Ok(());
        };
        self.input.close().await;

        let transcriber = self.transcriber.clone();
        tokio::spawn(async move {
            let samples = match recording.collector.await {
                Ok(samples) => samples,
                Err(e) => {
                    recording
                        .events
                        .emit(RecognizerEvent::Failed(format!("audio collection failed: {e}")));
                    return;
                }
            };
            debug!(samples = samples.len(), "Transcribing buffered recording.");
            if !samples.is_empty() {
                match transcribe_recording(
                    transcriber,
                    samples,
                    recording.sample_rate,
                    recording.language,
                )
                .await
                {
                    Ok(text) if !text.trim().is_empty() => {
                        recording.events.emit(RecognizerEvent::Transcript(text));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = ?e, "Offline transcription failed.");
                        recording
                            .events
                            .emit(RecognizerEvent::Failed(e.to_string()));
                        return;
                    }
                }
            }
            recording.events.emit(RecognizerEvent::Ended);
        });
        Ok(())
    }

    async fn abort(&self) {
        if let Some(recording) = self.recording.lock().await.take() {
            recording.collector.abort();
        }
        self.input.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct ScriptedService {
        script: Vec<ServiceEvent>,
        sender: std::sync::Mutex<Option<mpsc::UnboundedSender<ServiceEvent>>>,
    }

    #[async_trait]
    impl RecognitionService for ScriptedService {
        async fn start(
            &self,
            _language: &str,
            events: mpsc::UnboundedSender<ServiceEvent>,
        ) -> Result<(), ClientError> {
            *self.sender.lock().unwrap() = Some(events);
            Ok(())
        }

        async fn stop(&self) {
            if let Some(tx) = self.sender.lock().unwrap().take() {
                for event in &self.script {
                    tx.send(event.clone()).unwrap();
                }
            }
        }

        async fn abort(&self) {
            self.sender.lock().unwrap().take();
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<CaptureEvent>) -> RecognizerEvent {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event.signal {
            CaptureSignal::Recognizer(e) => e,
            other => panic!("unexpected capture signal {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_continuous_joins_final_segments() {
        let service = Arc::new(ScriptedService {
            script: vec![
                ServiceEvent::Interim("hel".into()),
                ServiceEvent::Final("hello".into()),
                ServiceEvent::Final(" there ".into()),
                ServiceEvent::End,
            ],
            sender: std::sync::Mutex::new(None),
        });
        let recognizer = ContinuousRecognizer::new(service);
        let (tx, mut rx) = mpsc::unbounded_channel();

        recognizer
            .start("en-US", RecognitionEvents::new(7, tx))
            .await
            .unwrap();
        recognizer.stop().await.unwrap();

        assert_eq!(
            next(&mut rx).await,
            RecognizerEvent::Transcript("hello there".into())
        );
        assert_eq!(next(&mut rx).await, RecognizerEvent::Ended);
    }

    #[tokio::test]
    async fn test_continuous_maps_permission_error() {
        let service = Arc::new(ScriptedService {
            script: vec![ServiceEvent::Error("not-allowed".into()), ServiceEvent::End],
            sender: std::sync::Mutex::new(None),
        });
        let recognizer = ContinuousRecognizer::new(service);
        let (tx, mut rx) = mpsc::unbounded_channel();

        recognizer
            .start("en-US", RecognitionEvents::new(1, tx))
            .await
            .unwrap();
        recognizer.stop().await.unwrap();

        match next(&mut rx).await {
            RecognizerEvent::Failed(message) => assert!(message.contains("permission")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_continuous_no_speech_ends_quietly() {
        let service = Arc::new(ScriptedService {
            script: vec![ServiceEvent::Error("no-speech".into()), ServiceEvent::End],
            sender: std::sync::Mutex::new(None),
        });
        let recognizer = ContinuousRecognizer::new(service);
        let (tx, mut rx) = mpsc::unbounded_channel();

        recognizer
            .start("en-US", RecognitionEvents::new(1, tx))
            .await
            .unwrap();
        recognizer.stop().await.unwrap();
        assert_eq!(next(&mut rx).await, RecognizerEvent::Ended);
    }

    struct FakeMicrophone {
        chunks: Vec<Vec<i16>>,
        sample_rate: u32,
        open: AtomicBool,
        feeder: std::sync::Mutex<Option<mpsc::Sender<Vec<i16>>>>,
    }

    #[async_trait]
    impl AudioInput for FakeMicrophone {
        async fn open(&self) -> Result<AudioStream, ClientError> {
            let (tx, rx) = mpsc::channel(self.chunks.len().max(1));
            for chunk in &self.chunks {
                tx.send(chunk.clone()).await.unwrap();
            }
            *self.feeder.lock().unwrap() = Some(tx);
            self.open.store(true, Ordering::SeqCst);
            Ok(AudioStream {
                sample_rate: self.sample_rate,
                chunks: rx,
            })
        }

        async fn close(&self) {
            self.feeder.lock().unwrap().take();
            self.open.store(false, Ordering::SeqCst);
        }
    }

    struct LengthTranscriber;

    #[async_trait]
    impl Transcriber for LengthTranscriber {
        async fn transcribe(&self, samples: &[f32], _language: &str) -> anyhow::Result<String> {
            Ok(format!("{} samples", samples.len()))
        }
    }

    #[tokio::test]
    async fn test_buffered_transcribes_on_stop_and_releases_microphone() {
        let microphone = Arc::new(FakeMicrophone {
            chunks: vec![vec![1000; 800], vec![-1000; 800]],
            sample_rate: 16000,
            open: AtomicBool::new(false),
            feeder: std::sync::Mutex::new(None),
        });
        let recognizer = BufferedRecognizer::new(microphone.clone(), Arc::new(LengthTranscriber));
        let (tx, mut rx) = mpsc::unbounded_channel();

        recognizer
            .start("en-US", RecognitionEvents::new(3, tx))
            .await
            .unwrap();
        assert!(microphone.open.load(Ordering::SeqCst));

        recognizer.stop().await.unwrap();
        assert!(!microphone.open.load(Ordering::SeqCst));

        assert_eq!(
            next(&mut rx).await,
            RecognizerEvent::Transcript("1600 samples".into())
        );
        assert_eq!(next(&mut rx).await, RecognizerEvent::Ended);
    }

    #[tokio::test]
    async fn test_buffered_empty_recording_has_no_transcript() {
        let microphone = Arc::new(FakeMicrophone {
            chunks: vec![],
            sample_rate: 48000,
            open: AtomicBool::new(false),
            feeder: std::sync::Mutex::new(None),
        });
        let recognizer = BufferedRecognizer::new(microphone, Arc::new(LengthTranscriber));
        let (tx, mut rx) = mpsc::unbounded_channel();

        recognizer
            .start("en-US", RecognitionEvents::new(1, tx))
            .await
            .unwrap();
        recognizer.stop().await.unwrap();
        assert_eq!(next(&mut rx).await, RecognizerEvent::Ended);
    }
}
