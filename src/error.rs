//! Error types for the voice agent

use thiserror::Error;

/// Result type alias for voice agent operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice agent
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credential, invalid setting)
    #[error("configuration error: {0}")]
    Config(String),

    /// Caller passed an argument the operation cannot honor
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Audio device missing, busy, or released
    #[error("device error: {0}")]
    Device(String),

    /// Microphone read failed mid-recording
    #[error("recording error: {0}")]
    Recording(String),

    /// Speaker write failed mid-playback
    #[error("playback error: {0}")]
    Playback(String),

    /// Audio container encode/decode error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Chat completion error
    #[error("response error: {0}")]
    Response(String),

    /// Text-to-speech error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// WAV container error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}
