//! Audio capture from microphone

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};
use tokio::sync::mpsc;

use super::AudioSource;
use super::clip::{AudioClip, ChunkAccumulator, PcmSpec, chunks_for_duration};
use super::decode::{downmix, resample};
use crate::config::AudioConfig;
use crate::{Error, Result};

/// Extra time allowed for the device to deliver a full recording
const STALL_GRACE: Duration = Duration::from_secs(2);

/// Messages from the capture callback thread
#[derive(Debug)]
enum CaptureEvent {
    Samples(Vec<f32>),
    Failed(String),
}

/// Captures fixed-duration clips from the default input device
///
/// The input stream is built once and held for the whole session; it is
/// only unpaused while a recording is in progress.
pub struct AudioCapture {
    format: DeviceFormat,
    spec: PcmSpec,
    chunk_frames: usize,
    stream: Option<Stream>,
    events: mpsc::UnboundedReceiver<CaptureEvent>,
    armed: Arc<AtomicBool>,
}

impl AudioCapture {
    /// Acquire the default input device
    ///
    /// Prefers a device config at the requested rate and channel count.
    /// Devices that only expose their native format are opened at that
    /// format, and recordings are converted before chunking.
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if no input device exists, it has no usable
    /// config, or it is held by another process
    pub fn new(audio: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device available".to_string()))?;

        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_input_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .collect();
        let requested = pick_input_config(&ranges, audio.sample_rate, audio.channels);

        let config = match requested {
            Some(config) => config,
            None => {
                let native = device
                    .default_input_config()
                    .map_err(|e| Error::Device(format!("no usable input config: {e}")))?
                    .config();
                tracing::warn!(
                    requested_rate = audio.sample_rate,
                    requested_channels = audio.channels,
                    device_rate = native.sample_rate.0,
                    device_channels = native.channels,
                    "input device does not support the requested format, converting"
                );
                native
            }
        };

        let (tx, events) = mpsc::unbounded_channel();
        let err_tx = tx.clone();
        let armed = Arc::new(AtomicBool::new(false));
        let gate = Arc::clone(&armed);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if gate.load(Ordering::Acquire) {
                        let _ = tx.send(CaptureEvent::Samples(data.to_vec()));
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio capture error");
                    let _ = err_tx.send(CaptureEvent::Failed(err.to_string()));
                },
                None,
            )
            .map_err(|e| match e {
                BuildStreamError::DeviceNotAvailable => {
                    Error::Device("input device is busy or unavailable".to_string())
                }
                other => Error::Device(other.to_string()),
            })?;

        // Some backends start streams eagerly
        if let Err(e) = stream.pause() {
            tracing::debug!(error = %e, "input stream could not be paused");
        }

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            chunk_size = audio.chunk_size,
            "audio capture initialized"
        );

        Ok(Self {
            format: DeviceFormat {
                sample_rate: config.sample_rate.0,
                channels: config.channels,
            },
            spec: PcmSpec::pcm16(audio.sample_rate, audio.channels),
            chunk_frames: audio.chunk_size,
            stream: Some(stream),
            events,
            armed,
        })
    }

    /// Whether the input device is still held
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Rate the input device is running at
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    /// Drop anything the callback queued outside a recording
    fn drain_stale(&mut self) {
        while self.events.try_recv().is_ok() {}
    }
}

/// Layout of the samples the device delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DeviceFormat {
    sample_rate: u32,
    channels: u16,
}

impl DeviceFormat {
    const fn matches(self, spec: PcmSpec) -> bool {
        self.sample_rate == spec.sample_rate && self.channels == spec.channels
    }
}

/// Pick an f32 input config with exactly the requested rate and channels
fn pick_input_config(
    ranges: &[SupportedStreamConfigRange],
    sample_rate: u32,
    channels: u16,
) -> Option<StreamConfig> {
    let rate = SampleRate(sample_rate);
    ranges
        .iter()
        .find(|c| {
            c.channels() == channels
                && c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= rate
                && c.max_sample_rate() >= rate
        })
        .map(|c| c.clone().with_sample_rate(rate).config())
}

fn check_duration(duration: Duration) -> Result<()> {
    if duration.is_zero() {
        return Err(Error::InvalidArgument(
            "recording duration must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Pull device events into a clip of `duration`
///
/// Fails with `Error::Recording` on a device error, a closed stream or a
/// device that stalls past `duration + STALL_GRACE`; partial audio is
/// discarded in every case.
async fn collect_clip(
    events: &mut mpsc::UnboundedReceiver<CaptureEvent>,
    format: DeviceFormat,
    spec: PcmSpec,
    chunk_frames: usize,
    duration: Duration,
) -> Result<AudioClip> {
    check_duration(duration)?;

    let target = chunks_for_duration(spec.sample_rate, chunk_frames, duration);
    let mut acc = ChunkAccumulator::new(spec, chunk_frames, target);
    let deadline = tokio::time::Instant::now() + duration + STALL_GRACE;

    // Converted recordings are gathered whole, then resampled in one pass
    let native = format.matches(spec);
    let needed = device_samples_needed(format, spec, target * chunk_frames.max(1));
    let mut raw = Vec::new();

    while !acc.is_complete() {
        let samples = match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(CaptureEvent::Samples(samples))) => samples,
            Ok(Some(CaptureEvent::Failed(e))) => return Err(Error::Recording(e)),
            Ok(None) => {
                return Err(Error::Recording("capture stream closed".to_string()));
            }
            Err(_) => {
                return Err(Error::Recording(format!(
                    "microphone stalled after {} of {target} chunks",
                    acc.completed_chunks()
                )));
            }
        };

        if native {
            acc.push_samples(&samples);
            continue;
        }

        raw.extend_from_slice(&samples);
        if raw.len() >= needed {
            acc.push_samples(&convert(&raw, format, spec)?);
            break;
        }
    }

    if !acc.is_complete() {
        return Err(Error::Recording(format!(
            "converted recording filled {} of {target} chunks",
            acc.completed_chunks()
        )));
    }

    Ok(acc.into_clip())
}

/// Interleaved device samples that cover `frames` frames of `spec`
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn device_samples_needed(format: DeviceFormat, spec: PcmSpec, frames: usize) -> usize {
    let ratio = f64::from(format.sample_rate) / f64::from(spec.sample_rate.max(1));
    // One spare frame absorbs resampler rounding
    let device_frames = (frames as f64 * ratio).ceil() as usize + 1;
    device_frames * usize::from(format.channels.max(1))
}

/// Downmix, resample and re-interleave device samples into `spec`'s layout
fn convert(raw: &[f32], format: DeviceFormat, spec: PcmSpec) -> Result<Vec<f32>> {
    let mono = downmix(raw, usize::from(format.channels.max(1)));
    let resampled = resample(&mono, format.sample_rate, spec.sample_rate)
        .map_err(|e| Error::Recording(e.to_string()))?;

    let channels = usize::from(spec.channels.max(1));
    Ok(resampled
        .into_iter()
        .flat_map(|s| std::iter::repeat_n(s, channels))
        .collect())
}

#[async_trait(?Send)]
impl AudioSource for AudioCapture {
    async fn record(&mut self, duration: Duration) -> Result<AudioClip> {
        check_duration(duration)?;
        self.drain_stale();

        let Some(stream) = self.stream.as_ref() else {
            return Err(Error::Device("input device has been released".to_string()));
        };

        self.armed.store(true, Ordering::Release);
        if let Err(e) = stream.play() {
            self.armed.store(false, Ordering::Release);
            return Err(Error::Device(e.to_string()));
        }
        tracing::debug!(secs = duration.as_secs_f32(), "recording started");

        let result = collect_clip(
            &mut self.events,
            self.format,
            self.spec,
            self.chunk_frames,
            duration,
        )
        .await;

        self.armed.store(false, Ordering::Release);
        if let Some(stream) = self.stream.as_ref()
            && let Err(e) = stream.pause()
        {
            tracing::debug!(error = %e, "input stream could not be paused");
        }

        // Partial audio is discarded on failure
        let clip = result?;
        tracing::debug!(
            chunks = clip.chunks().len(),
            frames = clip.frame_count(),
            "recording stopped"
        );
        Ok(clip)
    }

    fn teardown(&mut self) {
        self.armed.store(false, Ordering::Release);
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture released");
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NATIVE: DeviceFormat = DeviceFormat {
        sample_rate: 16_000,
        channels: 1,
    };

    fn spec() -> PcmSpec {
        PcmSpec::pcm16(16_000, 1)
    }

    #[tokio::test]
    async fn test_zero_duration_is_invalid() {
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let err = collect_clip(&mut rx, NATIVE, spec(), 160, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_fills_target_chunks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        // 100 ms at 16 kHz with 160-frame chunks = 10 chunks
        for _ in 0..11 {
            tx.send(CaptureEvent::Samples(vec![0.25; 160])).unwrap();
        }

        let clip = collect_clip(&mut rx, NATIVE, spec(), 160, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(clip.chunks().len(), 10);
        assert_eq!(clip.frame_count(), 1600);
    }

    #[tokio::test]
    async fn test_device_error_discards_partial_audio() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(CaptureEvent::Samples(vec![0.1; 480])).unwrap();
        tx.send(CaptureEvent::Failed("device unplugged".to_string())).unwrap();

        let err = collect_clip(&mut rx, NATIVE, spec(), 160, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Recording(ref msg) if msg == "device unplugged"));
    }

    #[tokio::test]
    async fn test_closed_stream_is_recording_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(CaptureEvent::Samples(vec![0.1; 160])).unwrap();
        drop(tx);

        let err = collect_clip(&mut rx, NATIVE, spec(), 160, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Recording(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_device_hits_deadline() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(CaptureEvent::Samples(vec![0.1; 320])).unwrap();

        let started = tokio::time::Instant::now();
        let err = collect_clip(&mut rx, NATIVE, spec(), 160, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Recording(ref msg) if msg.contains("stalled after 2 of 100")));
        assert!(started.elapsed() >= Duration::from_secs(1) + STALL_GRACE);
        drop(tx);
    }

    #[tokio::test]
    async fn test_converts_native_device_format() {
        let device = DeviceFormat {
            sample_rate: 48_000,
            channels: 2,
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        // 100 ms of 48 kHz stereo in 10 ms callbacks
        for _ in 0..12 {
            tx.send(CaptureEvent::Samples(vec![0.5; 960])).unwrap();
        }

        let clip = collect_clip(&mut rx, device, spec(), 160, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(clip.spec(), spec());
        assert_eq!(clip.chunks().len(), 10);
    }

    #[test]
    fn test_pick_input_config() {
        use cpal::SupportedBufferSize;

        let range = |channels, min, max| {
            SupportedStreamConfigRange::new(
                channels,
                SampleRate(min),
                SampleRate(max),
                SupportedBufferSize::Unknown,
                SampleFormat::F32,
            )
        };

        let config = pick_input_config(&[range(1, 8_000, 48_000)], 16_000, 1).unwrap();
        assert_eq!(config.sample_rate, SampleRate(16_000));
        assert!(pick_input_config(&[range(2, 48_000, 48_000)], 16_000, 1).is_none());
    }

    #[test]
    fn test_device_samples_needed() {
        let device = DeviceFormat {
            sample_rate: 48_000,
            channels: 2,
        };
        // 1600 frames at 16 kHz = 4800 device frames, plus one spare
        assert_eq!(device_samples_needed(device, spec(), 1600), 4801 * 2);
        assert_eq!(device_samples_needed(NATIVE, spec(), 1600), 1601);
    }
}
