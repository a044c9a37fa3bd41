//! Voice processing module
//!
//! Handles microphone capture, WAV framing, speaker playback, and the
//! OpenAI-compatible STT and TTS clients.

mod capture;
mod clip;
mod decode;
mod devices;
mod playback;
pub mod stt;
pub mod tts;

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

pub use capture::AudioCapture;
pub use clip::{AudioClip, BITS_PER_SAMPLE, ChunkAccumulator, PcmSpec, chunks_for_duration, read_wav_spec};
pub use decode::{DecodedAudio, decode_audio, resample};
pub use devices::{DeviceInventory, list_devices};
pub use playback::AudioPlayback;
pub use stt::SpeechToText;
pub use tts::TextToSpeech;

/// A microphone the conversation loop can record from
///
/// Device streams are not `Send` on every platform, so implementations are
/// driven from the loop's own task.
#[async_trait(?Send)]
pub trait AudioSource {
    /// Record a clip of fixed length
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for a zero duration, `Error::Recording`
    /// if the device fails mid-recording (partial audio is discarded) and
    /// `Error::Device` if the device is gone
    async fn record(&mut self, duration: Duration) -> Result<AudioClip>;

    /// Release the device; safe to call repeatedly
    fn teardown(&mut self);
}

/// A speaker the conversation loop can play synthesized speech on
#[async_trait(?Send)]
pub trait AudioSink {
    /// Play an encoded audio payload to completion
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if the payload cannot be decoded or the
    /// device fails mid-stream, and `Error::Device` if the device is gone
    async fn play(&mut self, audio: &[u8]) -> Result<()>;

    /// Release the device; safe to call repeatedly
    fn teardown(&mut self);
}
