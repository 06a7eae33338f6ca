//! Client side of the voice chat: one reconnecting transport to the gateway,
//! speech capture and speech output state machines, and the controller that
//! switches between text and voice.

pub mod audio;
pub mod capability;
pub mod capture;
pub mod controller;
pub mod error;
pub mod output;
pub mod recognizer;
pub mod transport;

#[cfg(test)]
mod testing;

pub use capability::{Capabilities, SpeechPlatform, probe};
pub use capture::{CaptureState, SpeechCapture};
pub use controller::{Command, ControllerEvents, Mode, ModeController};
pub use error::ClientError;
pub use output::{OutputState, SpeakOptions, SpeechOutput, select_voice};
pub use transport::{FrameSink, Transport, TransportConfig, TransportState};
