//! In-process fakes of the platform speech backends and the transport.

use crate::{
    capability::SpeechPlatform,
    error::ClientError,
    output::{SpeechSynthesizer, Utterance, UtteranceEvents, Voice},
    recognizer::{AudioInput, AudioStream, RecognitionService, ServiceEvent, Transcriber},
    transport::FrameSink,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use voxchat_core::ClientFrame;

/// Shared, ordered record of calls across fakes.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn entries(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub struct RecordingSink {
    connected: bool,
    frames: Mutex<Vec<ClientFrame>>,
    pub log: CallLog,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self {
            connected: true,
            frames: Mutex::new(Vec::new()),
            log: CallLog::default(),
        }
    }
}

impl RecordingSink {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::default()
        }
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn frames(&self) -> Vec<ClientFrame> {
        self.frames.lock().unwrap().clone()
    }
}

impl FrameSink for RecordingSink {
    fn send(&self, frame: &ClientFrame) -> Result<(), ClientError> {
        if !self.connected {
            return Err(ClientError::NotConnected);
        }
        let name = match frame {
            ClientFrame::Message { .. } => "message",
            ClientFrame::VoiceMessage { .. } => "voice_message",
            ClientFrame::Interrupt {} => "interrupt",
        };
        self.log.lock().unwrap().push(format!("send:{name}"));
        self.frames.lock().unwrap().push(frame.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRecognitionService {
    transcript: String,
    deny: bool,
    sender: Mutex<Option<mpsc::UnboundedSender<ServiceEvent>>>,
    pub log: CallLog,
}

impl FakeRecognitionService {
    pub fn with_transcript(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            ..Self::default()
        }
    }

    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    pub fn with_log(transcript: &str, log: CallLog) -> Self {
        Self {
            transcript: transcript.to_string(),
            log,
            ..Self::default()
        }
    }

    pub fn is_listening(&self) -> bool {
        self.sender.lock().unwrap().is_some()
    }

    /// Simulates the user going quiet: final result, then end.
    pub fn finish_speaking(&self) {
        if let Some(tx) = self.sender.lock().unwrap().take() {
            let _ = tx.send(ServiceEvent::Final(self.transcript.clone()));
            let _ = tx.send(ServiceEvent::End);
        }
    }
}

#[async_trait]
impl RecognitionService for FakeRecognitionService {
    async fn start(
        &self,
        _language: &str,
        events: mpsc::UnboundedSender<ServiceEvent>,
    ) -> Result<(), ClientError> {
        if self.deny {
            return Err(ClientError::Capture("not-allowed".to_string()));
        }
        self.log.lock().unwrap().push("recognizer:start".to_string());
        *self.sender.lock().unwrap() = Some(events);
        Ok(())
    }

    async fn stop(&self) {
        self.log.lock().unwrap().push("recognizer:stop".to_string());
        self.finish_speaking();
    }

    async fn abort(&self) {
        self.log.lock().unwrap().push("recognizer:abort".to_string());
        self.sender.lock().unwrap().take();
    }
}

#[derive(Default)]
pub struct FakeMicrophone;

#[async_trait]
impl AudioInput for FakeMicrophone {
    async fn open(&self) -> Result<AudioStream, ClientError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(AudioStream {
            sample_rate: 16000,
            chunks: rx,
        })
    }

    async fn close(&self) {}
}

pub struct FakeTranscriber;

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _samples: &[f32], _language: &str) -> anyhow::Result<String> {
        Ok(String::new())
    }
}

#[derive(Default)]
pub struct FakeSynthesizer {
    pub log: CallLog,
    pending: Mutex<Vec<UtteranceEvents>>,
}

impl FakeSynthesizer {
    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Completes the most recent utterance.
    pub fn finish_latest(&self) {
        if let Some(events) = self.pending.lock().unwrap().last() {
            events.emit(crate::output::SynthesisEvent::Finished);
        }
    }
}

impl SpeechSynthesizer for FakeSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        vec![Voice {
            name: "Test Voice (Natural)".to_string(),
            locale: "en-US".to_string(),
        }]
    }

    fn speak(&self, utterance: Utterance, events: UtteranceEvents) -> Result<(), ClientError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("output:speak:{}", utterance.text));
        self.pending.lock().unwrap().push(events);
        Ok(())
    }

    fn cancel(&self) {
        self.log.lock().unwrap().push("output:cancel".to_string());
    }

    fn pause(&self) {
        self.log.lock().unwrap().push("output:pause".to_string());
    }

    fn resume(&self) {
        self.log.lock().unwrap().push("output:resume".to_string());
    }
}

#[derive(Default)]
pub struct FakePlatform {
    pub service: Option<Arc<dyn RecognitionService>>,
    pub input: Option<Arc<dyn AudioInput>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
}

impl SpeechPlatform for FakePlatform {
    fn recognition_service(&self) -> Option<Arc<dyn RecognitionService>> {
        self.service.clone()
    }

    fn audio_input(&self) -> Option<Arc<dyn AudioInput>> {
        self.input.clone()
    }

    fn transcriber(&self) -> Option<Arc<dyn Transcriber>> {
        self.transcriber.clone()
    }

    fn synthesizer(&self) -> Option<Arc<dyn SpeechSynthesizer>> {
        self.synthesizer.clone()
    }
}
