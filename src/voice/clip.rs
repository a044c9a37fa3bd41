//! Recorded audio clips and WAV framing

use std::io::Cursor;
use std::time::Duration;

use crate::{Error, Result};

/// Bit depth of captured PCM
pub const BITS_PER_SAMPLE: u16 = 16;

/// Bytes per captured sample
const BYTES_PER_SAMPLE: usize = 2;

/// PCM layout metadata carried alongside raw samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmSpec {
    /// 16-bit PCM at the given rate and channel count
    #[must_use]
    pub const fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: BITS_PER_SAMPLE,
        }
    }

    /// Bytes occupied by one frame (one sample per channel)
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

/// An ordered sequence of fixed-size 16-bit little-endian PCM chunks
#[derive(Debug, Clone)]
pub struct AudioClip {
    spec: PcmSpec,
    chunks: Vec<Vec<u8>>,
}

impl AudioClip {
    /// Create an empty clip
    #[must_use]
    pub const fn new(spec: PcmSpec) -> Self {
        Self {
            spec,
            chunks: Vec::new(),
        }
    }

    /// Append a chunk of interleaved PCM bytes
    pub fn push_chunk(&mut self, chunk: Vec<u8>) {
        self.chunks.push(chunk);
    }

    /// PCM layout of this clip
    #[must_use]
    pub const fn spec(&self) -> PcmSpec {
        self.spec
    }

    /// Captured chunks in recording order
    #[must_use]
    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// Whether no audio was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(Vec::is_empty)
    }

    /// Total number of frames across all chunks
    #[must_use]
    pub fn frame_count(&self) -> usize {
        let bytes: usize = self.chunks.iter().map(Vec::len).sum();
        bytes / self.spec.frame_bytes().max(1)
    }

    /// Playback length of the clip
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / f64::from(self.spec.sample_rate.max(1)))
    }

    /// Encode the clip as a WAV container
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: self.spec.channels,
            sample_rate: self.spec.sample_rate,
            bits_per_sample: self.spec.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

            for chunk in &self.chunks {
                for bytes in chunk.chunks_exact(BYTES_PER_SAMPLE) {
                    writer
                        .write_sample(i16::from_le_bytes([bytes[0], bytes[1]]))
                        .map_err(|e| Error::Audio(e.to_string()))?;
                }
            }

            writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
        }

        Ok(cursor.into_inner())
    }
}

/// Read the PCM layout back out of a WAV header
///
/// # Errors
///
/// Returns error if the bytes are not a readable WAV container
pub fn read_wav_spec(wav: &[u8]) -> Result<PcmSpec> {
    let reader = hound::WavReader::new(Cursor::new(wav))?;
    let spec = reader.spec();
    Ok(PcmSpec {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
    })
}

/// Number of whole chunks that fit in a recording of `duration`
///
/// Always at least one, so a very short recording still yields audio.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn chunks_for_duration(sample_rate: u32, chunk_frames: usize, duration: Duration) -> usize {
    let frames = f64::from(sample_rate) * duration.as_secs_f64();
    ((frames / chunk_frames.max(1) as f64).floor() as usize).max(1)
}

/// Cuts a stream of `f32` device samples into fixed-size PCM chunks
pub struct ChunkAccumulator {
    clip: AudioClip,
    chunk_bytes: usize,
    target_chunks: usize,
    pending: Vec<u8>,
}

impl ChunkAccumulator {
    /// Accumulate `target_chunks` chunks of `chunk_frames` frames each
    #[must_use]
    pub fn new(spec: PcmSpec, chunk_frames: usize, target_chunks: usize) -> Self {
        let chunk_bytes = chunk_frames.max(1) * spec.frame_bytes();
        Self {
            clip: AudioClip::new(spec),
            chunk_bytes,
            target_chunks,
            pending: Vec::with_capacity(chunk_bytes),
        }
    }

    /// Feed interleaved samples; anything past the target is dropped
    pub fn push_samples(&mut self, samples: &[f32]) {
        for &sample in samples {
            if self.is_complete() {
                return;
            }

            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            self.pending.extend_from_slice(&sample_i16.to_le_bytes());

            if self.pending.len() == self.chunk_bytes {
                let chunk = std::mem::replace(&mut self.pending, Vec::with_capacity(self.chunk_bytes));
                self.clip.push_chunk(chunk);
            }
        }
    }

    /// Whether the target chunk count has been reached
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.clip.chunks.len() >= self.target_chunks
    }

    /// Chunks completed so far
    #[must_use]
    pub fn completed_chunks(&self) -> usize {
        self.clip.chunks.len()
    }

    /// Finish accumulation, discarding any partial trailing chunk
    #[must_use]
    pub fn into_clip(self) -> AudioClip {
        self.clip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_for_duration() {
        // 16000 / 1024 * 5 = 78.125
        assert_eq!(chunks_for_duration(16_000, 1024, Duration::from_secs(5)), 78);
        assert_eq!(chunks_for_duration(16_000, 1000, Duration::from_secs(1)), 16);
        assert_eq!(chunks_for_duration(16_000, 1024, Duration::from_millis(10)), 1);
    }

    #[test]
    fn test_accumulator_cuts_fixed_chunks() {
        let spec = PcmSpec::pcm16(16_000, 1);
        let mut acc = ChunkAccumulator::new(spec, 4, 3);

        acc.push_samples(&[0.1; 5]);
        assert_eq!(acc.completed_chunks(), 1);
        assert!(!acc.is_complete());

        acc.push_samples(&[0.1; 20]);
        assert!(acc.is_complete());

        let clip = acc.into_clip();
        assert_eq!(clip.chunks().len(), 3);
        assert!(clip.chunks().iter().all(|c| c.len() == 8));
        assert_eq!(clip.frame_count(), 12);
    }

    #[test]
    fn test_accumulator_stereo_frames() {
        let spec = PcmSpec::pcm16(8_000, 2);
        let mut acc = ChunkAccumulator::new(spec, 2, 1);
        acc.push_samples(&[0.5, -0.5, 0.25, -0.25]);

        let clip = acc.into_clip();
        assert_eq!(clip.chunks().len(), 1);
        assert_eq!(clip.chunks()[0].len(), 8);
        assert_eq!(clip.frame_count(), 2);
    }

    #[test]
    fn test_sample_conversion_clamps() {
        let spec = PcmSpec::pcm16(16_000, 1);
        let mut acc = ChunkAccumulator::new(spec, 3, 1);
        acc.push_samples(&[2.0, -2.0, 0.0]);

        let chunk = acc.into_clip().chunks()[0].clone();
        assert_eq!(i16::from_le_bytes([chunk[0], chunk[1]]), 32767);
        assert_eq!(i16::from_le_bytes([chunk[2], chunk[3]]), -32768);
        assert_eq!(i16::from_le_bytes([chunk[4], chunk[5]]), 0);
    }

    #[test]
    fn test_duration() {
        let spec = PcmSpec::pcm16(16_000, 1);
        let mut clip = AudioClip::new(spec);
        clip.push_chunk(vec![0; 16_000 * 2]);
        assert_eq!(clip.duration(), Duration::from_secs(1));
        assert!(!clip.is_empty());
        assert!(AudioClip::new(spec).is_empty());
    }

    #[test]
    fn test_wav_header_roundtrip() {
        let spec = PcmSpec::pcm16(22_050, 2);
        let mut acc = ChunkAccumulator::new(spec, 128, 2);
        acc.push_samples(&[0.25; 512]);
        let clip = acc.into_clip();

        let wav = clip.to_wav().unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(read_wav_spec(&wav).unwrap(), spec);
    }

    #[test]
    fn test_read_wav_spec_rejects_garbage() {
        assert!(read_wav_spec(b"definitely not a wav file").is_err());
    }
}
