//! Validation of inbound frames. The frame types themselves are shared with
//! the client and live in `voxchat_core::protocol`.

pub use voxchat_core::protocol::{ClientFrame, ServerFrame};

/// Why an inbound frame was rejected. Answered with an `error` frame; the
/// connection stays open.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Invalid message format: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Field '{0}' must be a non-empty string")]
    EmptyContent(&'static str),
}

/// Decodes a text frame and checks its payload.
pub fn parse_frame(text: &str) -> Result<ClientFrame, FrameError> {
    let frame: ClientFrame = serde_json::from_str(text)?;
    match &frame {
        ClientFrame::Message { content } if content.trim().is_empty() => {
            Err(FrameError::EmptyContent("content"))
        }
        ClientFrame::VoiceMessage { transcribed_text } if transcribed_text.trim().is_empty() => {
            Err(FrameError::EmptyContent("transcribedText"))
        }
        _ => Ok(frame),
    }
}
