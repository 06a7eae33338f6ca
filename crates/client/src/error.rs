use tokio_tungstenite::tungstenite;

/// Errors surfaced by the client side of the chat.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Not connected to the server")]
    NotConnected,
    #[error("{0}")]
    CapabilityUnavailable(String),
    #[error("Connection failed: {0}")]
    Connect(#[from] tungstenite::Error),
    #[error("Voice recognition error: {0}")]
    Capture(String),
    #[error("Speech error: {0}")]
    Playback(String),
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}
