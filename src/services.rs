//! Seams between the conversation loop and its remote collaborators
//!
//! The loop only ever talks to these traits. The OpenAI-backed clients live
//! in [`crate::voice::stt`], [`crate::agent::chat`] and [`crate::voice::tts`].

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::conversation::Turn;
use crate::{Error, Result};

/// Audio container formats exchanged with the speech services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioContainer {
    Wav,
    Mp3,
}

impl AudioContainer {
    /// Identifier used in API requests
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
        }
    }

    /// MIME type for multipart uploads
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
        }
    }

    /// File name used for multipart uploads
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Wav => "audio.wav",
            Self::Mp3 => "audio.mp3",
        }
    }
}

impl fmt::Display for AudioContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioContainer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wav" => Ok(Self::Wav),
            "mp3" => Ok(Self::Mp3),
            other => Err(Error::Config(format!(
                "unsupported audio format {other:?} (expected \"wav\" or \"mp3\")"
            ))),
        }
    }
}

/// Turns recorded audio into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an encoded audio container
    ///
    /// An empty string means nothing intelligible was said; it is not an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transcription` on malformed audio or service failure
    async fn transcribe(&self, audio: &[u8], container: AudioContainer) -> Result<String>;
}

/// Produces the next assistant turn from the conversation so far
#[async_trait]
pub trait Responder: Send + Sync {
    /// Complete the conversation
    ///
    /// # Errors
    ///
    /// Returns `Error::Response` on service failure, rate limiting or
    /// invalid configuration
    async fn complete(&self, turns: &[Turn]) -> Result<String>;
}

/// Turns assistant text into speech audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` into an encoded audio container
    ///
    /// # Errors
    ///
    /// Returns `Error::Synthesis` on service failure
    async fn synthesize(&self, text: &str, container: AudioContainer) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_parse() {
        assert_eq!("WAV".parse::<AudioContainer>().unwrap(), AudioContainer::Wav);
        assert_eq!(" mp3 ".parse::<AudioContainer>().unwrap(), AudioContainer::Mp3);
        assert!("flac".parse::<AudioContainer>().is_err());
    }

    #[test]
    fn test_container_metadata() {
        assert_eq!(AudioContainer::Wav.mime_type(), "audio/wav");
        assert_eq!(AudioContainer::Mp3.file_name(), "audio.mp3");
        assert_eq!(AudioContainer::Mp3.to_string(), "mp3");
    }
}
