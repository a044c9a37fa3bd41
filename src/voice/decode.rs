//! Decoding synthesized speech into playable samples

use std::borrow::Cow;
use std::io::Cursor;

use crate::{Error, Result};

/// Mono `f32` samples at a known rate
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode WAV or MP3 bytes to mono samples
///
/// The container is sniffed from the leading bytes.
///
/// # Errors
///
/// Returns error if the payload is empty or cannot be decoded
pub fn decode_audio(data: &[u8]) -> Result<DecodedAudio> {
    if data.is_empty() {
        return Err(Error::Audio("empty audio payload".to_string()));
    }

    if data.starts_with(b"RIFF") {
        decode_wav(data)
    } else {
        decode_mp3(data)
    }
}

/// Decode WAV bytes to mono f32 samples
///
/// Streaming TTS responses carry placeholder RIFF and data lengths, which
/// are clamped to the bytes actually present before parsing. A truncated
/// tail ends decoding instead of failing it.
#[allow(clippy::cast_precision_loss)]
fn decode_wav(data: &[u8]) -> Result<DecodedAudio> {
    let data = clamp_streaming_sizes(data);
    let mut reader = hound::WavReader::new(Cursor::new(data.as_ref()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map_while(std::result::Result::ok)
            .collect(),
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map_while(std::result::Result::ok)
                .map(|s| s as f32 / scale)
                .collect()
        }
    };

    if interleaved.is_empty() {
        return Err(Error::Audio("wav payload contains no samples".to_string()));
    }

    Ok(DecodedAudio {
        samples: downmix(&interleaved, channels),
        sample_rate: spec.sample_rate,
    })
}

/// Rewrite RIFF and `data` chunk sizes that overrun the buffer
///
/// Streaming encoders write `0xFFFFFFFF` because the final length is unknown
/// when the header goes out. The data size becomes the remaining byte count
/// rounded down to a whole frame; the buffer is only copied when a size
/// needs rewriting.
fn clamp_streaming_sizes(data: &[u8]) -> Cow<'_, [u8]> {
    const RIFF_HEADER: usize = 12;

    if data.len() < RIFF_HEADER || &data[8..12] != b"WAVE" {
        return Cow::Borrowed(data);
    }

    let mut patched: Option<Vec<u8>> = None;

    let riff_actual = u32::try_from(data.len() - 8).unwrap_or(u32::MAX);
    if read_u32_le(data, 4) > riff_actual {
        patched.get_or_insert_with(|| data.to_vec())[4..8].copy_from_slice(&riff_actual.to_le_bytes());
    }

    let mut block_align = 1_usize;
    let mut pos = RIFF_HEADER;
    while pos + 8 <= data.len() {
        let id = &data[pos..pos + 4];
        let size = usize::try_from(read_u32_le(data, pos + 4)).unwrap_or(usize::MAX);
        let body = pos + 8;
        let remaining = data.len() - body;

        // fmt layout: format, channels, rate, byte rate, block align
        if id == b"fmt " && remaining >= 14 {
            block_align = usize::from(u16::from_le_bytes([data[body + 12], data[body + 13]])).max(1);
        }

        if id == b"data" {
            if size > remaining {
                let whole_frames = remaining - remaining % block_align;
                let fitted = u32::try_from(whole_frames).unwrap_or(u32::MAX);
                patched.get_or_insert_with(|| data.to_vec())[pos + 4..pos + 8]
                    .copy_from_slice(&fitted.to_le_bytes());
            }
            break;
        }

        // Chunks are word aligned
        pos = body.saturating_add(size).saturating_add(size % 2);
    }

    patched.map_or(Cow::Borrowed(data), Cow::Owned)
}

fn read_u32_le(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Decode MP3 bytes to mono f32 samples
#[allow(clippy::cast_sign_loss)]
fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0_u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = frame.sample_rate as u32;
                let interleaved: Vec<f32> =
                    frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(downmix(&interleaved, frame.channels.max(1)));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(Error::Audio("mp3 payload contains no frames".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Average interleaved channels down to mono
#[allow(clippy::cast_precision_loss)]
pub(crate) fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample mono audio using rubato
///
/// The final partial block is zero-padded and the output trimmed back to
/// the expected length.
///
/// # Errors
///
/// Returns error if the resampler cannot be built or fails
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    // The resampler may round the block size to suit its FFT length
    let block_len = resampler.input_frames_next();
    let expected = (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;
    let mut output = Vec::with_capacity(expected + block_len);

    for chunk in samples.chunks(block_len) {
        let mut block: Vec<f64> = chunk.iter().map(|&s| f64::from(s)).collect();
        block.resize(block_len, 0.0);

        let result = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend(result[0].iter().map(|&s| s as f32));
    }

    // Flush the resampler's internal delay
    let delay = resampler.output_delay();
    while output.len() < expected + delay {
        let result = resampler
            .process(&[vec![0.0; block_len]], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend(result[0].iter().map(|&s| s as f32));
    }

    Ok(output.into_iter().skip(delay).take(expected).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_mono_wav() {
        let decoded = decode_audio(&wav_bytes(&[0, 16384, -16384], 24_000, 1)).unwrap();
        assert_eq!(decoded.sample_rate, 24_000);
        assert_eq!(decoded.samples, vec![0.0, 0.5, -0.5]);
    }

    #[test]
    fn test_decode_stereo_wav_downmixes() {
        let decoded = decode_audio(&wav_bytes(&[16384, 0, -16384, -16384], 16_000, 2)).unwrap();
        assert_eq!(decoded.samples, vec![0.25, -0.5]);
    }

    /// Overwrite the RIFF and data sizes the way a streaming encoder does
    fn with_streaming_sizes(mut wav: Vec<u8>, placeholder: u32) -> Vec<u8> {
        wav[4..8].copy_from_slice(&placeholder.to_le_bytes());
        let data_at = wav.windows(4).position(|w| w == b"data").unwrap();
        wav[data_at + 4..data_at + 8].copy_from_slice(&placeholder.to_le_bytes());
        wav
    }

    #[test]
    fn test_decode_streaming_placeholder_sizes() {
        let samples: Vec<i16> = (0..1000).map(|i| i16::try_from(i * 16).unwrap()).collect();
        let wav = with_streaming_sizes(wav_bytes(&samples, 24_000, 1), u32::MAX);

        let decoded = decode_audio(&wav).unwrap();
        assert_eq!(decoded.sample_rate, 24_000);
        assert_eq!(decoded.samples.len(), 1000);
        assert!((decoded.samples[999] - 15_984.0 / 32_768.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_decode_streaming_sizes_drop_partial_frame() {
        let mut wav = with_streaming_sizes(wav_bytes(&[100; 400], 16_000, 2), u32::MAX);
        // Stream cut mid-frame
        wav.extend_from_slice(&[0x01, 0x02, 0x03]);

        let decoded = decode_audio(&wav).unwrap();
        assert_eq!(decoded.samples.len(), 200);
    }

    #[test]
    fn test_well_formed_wav_is_not_copied() {
        let wav = wav_bytes(&[1, 2, 3], 24_000, 1);
        assert!(matches!(clamp_streaming_sizes(&wav), Cow::Borrowed(_)));
    }

    #[test]
    fn test_truncated_header_is_wav_error() {
        assert!(matches!(decode_audio(b"RIFF\x00\x00"), Err(Error::Wav(_))));
    }

    #[test]
    fn test_decode_empty_payload() {
        assert!(matches!(decode_audio(&[]), Err(Error::Audio(_))));
    }

    #[test]
    fn test_decode_garbage_is_error() {
        assert!(decode_audio(b"not audio at all").is_err());
    }

    #[test]
    fn test_resample_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 24_000, 24_000).unwrap(), samples);
    }

    #[test]
    fn test_resample_length() {
        let samples = vec![0.0; 16_000];
        let out = resample(&samples, 16_000, 24_000).unwrap();
        assert_eq!(out.len(), 24_000);
    }
}
