//! Voice pipeline integration tests
//!
//! Tests audio framing and decoding without requiring audio hardware

use std::time::Duration;

use voice_agent::voice::{ChunkAccumulator, PcmSpec, chunks_for_duration, decode_audio, read_wav_spec, resample};

mod common;

const SAMPLE_RATE: u32 = 16_000;

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

#[test]
fn test_recording_stops_at_target_chunk_count() {
    let spec = PcmSpec::pcm16(SAMPLE_RATE, 1);
    let target = chunks_for_duration(SAMPLE_RATE, 1024, Duration::from_secs(1));
    assert_eq!(target, 15);

    let mut acc = ChunkAccumulator::new(spec, 1024, target);

    // Device callbacks deliver uneven buffer sizes
    let samples = generate_sine_samples(440.0, 2.0, 0.5);
    for buffer in samples.chunks(333) {
        acc.push_samples(buffer);
    }

    assert!(acc.is_complete());
    let clip = acc.into_clip();
    assert_eq!(clip.chunks().len(), 15);
    assert!(clip.chunks().iter().all(|c| c.len() == 1024 * 2));
    assert_eq!(clip.frame_count(), 15 * 1024);
}

#[test]
fn test_recorded_clip_survives_wav_round_trip() {
    let spec = PcmSpec::pcm16(SAMPLE_RATE, 1);
    let mut acc = ChunkAccumulator::new(spec, 160, 10);
    let samples = generate_sine_samples(220.0, 0.1, 0.25);
    acc.push_samples(&samples);

    let clip = acc.into_clip();
    let wav = clip.to_wav().unwrap();

    assert_eq!(read_wav_spec(&wav).unwrap(), spec);
    // 44-byte canonical header plus the PCM payload
    assert_eq!(wav.len(), 44 + 1600 * 2);

    let decoded = decode_audio(&wav).unwrap();
    assert_eq!(decoded.sample_rate, SAMPLE_RATE);
    assert_eq!(decoded.samples.len(), 1600);
    for (got, want) in decoded.samples.iter().zip(&samples) {
        assert!((got - want).abs() < 1e-3, "{got} vs {want}");
    }
}

#[test]
fn test_speech_is_resampled_to_device_rate() {
    let samples = generate_sine_samples(440.0, 0.5, 0.5);
    let resampled = resample(&samples, SAMPLE_RATE, 24_000).unwrap();
    assert_eq!(resampled.len(), 12_000);

    // Energy survives resampling
    let peak = resampled.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
    assert!(peak > 0.4 && peak < 0.6, "peak {peak}");
}

#[test]
fn test_garbage_payload_is_rejected() {
    assert!(decode_audio(b"").is_err());
    assert!(decode_audio(b"RIFF\x00\x00").is_err());
    assert!(decode_audio(&[0x42; 512]).is_err());
}
