//! Audio playback to speakers

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};

use super::AudioSink;
use super::decode::{decode_audio, resample};
use crate::{Error, Result};

/// How often the writer checks queue depth and stream health
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Extra time allowed for the device to drain the queue
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Plays audio to the default output device
///
/// The output stream is built once and emits silence while idle, so the
/// device stays held between turns.
pub struct AudioPlayback {
    config: StreamConfig,
    chunk_frames: usize,
    stream: Option<Stream>,
    queue: Arc<Mutex<VecDeque<f32>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl AudioPlayback {
    /// Acquire the default output device
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if no output device exists or it has no
    /// usable config
    pub fn new(sample_rate: u32, chunk_frames: usize) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Device("no output device available".to_string()))?;

        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .collect();
        let requested = pick_output_config(&ranges, sample_rate);

        // Payloads are resampled to whatever rate the stream runs at
        let config = match requested {
            Some(config) => config,
            None => {
                let native = device
                    .default_output_config()
                    .map_err(|e| Error::Device(format!("no usable output config: {e}")))?
                    .config();
                tracing::warn!(
                    requested_rate = sample_rate,
                    device_rate = native.sample_rate.0,
                    "output device does not support the requested rate, using its default"
                );
                native
            }
        };
        let channels = usize::from(config.channels);

        let queue = Arc::new(Mutex::new(VecDeque::<f32>::new()));
        let failure = Arc::new(Mutex::new(None));
        let source = Arc::clone(&queue);
        let failed = Arc::clone(&failure);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut queue) = source.lock() else {
                        data.fill(0.0);
                        return;
                    };
                    for frame in data.chunks_mut(channels) {
                        let sample = queue.pop_front().unwrap_or(0.0);
                        frame.fill(sample);
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio playback error");
                    if let Ok(mut slot) = failed.lock() {
                        *slot = Some(err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| match e {
                BuildStreamError::DeviceNotAvailable => {
                    Error::Device("output device is busy or unavailable".to_string())
                }
                other => Error::Device(other.to_string()),
            })?;

        stream.play().map_err(|e| Error::Device(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            config,
            chunk_frames: chunk_frames.max(1),
            stream: Some(stream),
            queue,
            failure,
        })
    }

    /// Rate the output stream runs at
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Whether the output device is still held
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Play mono samples that are already at the device rate
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if the stream reports an error mid-playback
    pub async fn play_samples(&mut self, samples: &[f32]) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::Device("output device has been released".to_string()));
        }
        if samples.is_empty() {
            return Ok(());
        }

        // Errors from an earlier payload do not belong to this one
        let _ = self.take_failure();

        // Keep at most two chunks queued ahead of the device
        let high_water = self.chunk_frames * 2;
        for chunk in samples.chunks(self.chunk_frames) {
            while self.queued()? > high_water {
                self.check_failure()?;
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            self.check_failure()?;
            self.queue
                .lock()
                .map_err(|_| Error::Playback("playback queue poisoned".to_string()))?
                .extend(chunk.iter().copied());
        }

        #[allow(clippy::cast_precision_loss)]
        let tail = Duration::from_secs_f64(
            high_water as f64 / f64::from(self.config.sample_rate.0.max(1)),
        );
        let deadline = tokio::time::Instant::now() + tail + DRAIN_GRACE;
        while self.queued()? > 0 {
            self.check_failure()?;
            if tokio::time::Instant::now() > deadline {
                self.clear_queue();
                return Err(Error::Playback("output device stopped consuming audio".to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        self.check_failure()?;

        tracing::debug!(samples = samples.len(), "playback complete");
        Ok(())
    }

    fn queued(&self) -> Result<usize> {
        self.queue
            .lock()
            .map(|q| q.len())
            .map_err(|_| Error::Playback("playback queue poisoned".to_string()))
    }

    fn clear_queue(&self) {
        if let Ok(mut q) = self.queue.lock() {
            q.clear();
        }
    }

    fn take_failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|mut slot| slot.take())
    }

    fn check_failure(&self) -> Result<()> {
        match self.take_failure() {
            Some(e) => {
                self.clear_queue();
                Err(Error::Playback(e))
            }
            None => Ok(()),
        }
    }
}

/// Pick an f32 output config at `sample_rate`, mono first, then stereo
fn pick_output_config(ranges: &[SupportedStreamConfigRange], sample_rate: u32) -> Option<StreamConfig> {
    let rate = SampleRate(sample_rate);
    [1, 2].into_iter().find_map(|channels| {
        ranges
            .iter()
            .find(|c| {
                c.channels() == channels
                    && c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate() <= rate
                    && c.max_sample_rate() >= rate
            })
            .map(|c| c.clone().with_sample_rate(rate).config())
    })
}

#[async_trait(?Send)]
impl AudioSink for AudioPlayback {
    async fn play(&mut self, audio: &[u8]) -> Result<()> {
        let decoded = decode_audio(audio).map_err(|e| Error::Playback(e.to_string()))?;
        let samples = resample(&decoded.samples, decoded.sample_rate, self.config.sample_rate.0)
            .map_err(|e| Error::Playback(e.to_string()))?;

        tracing::debug!(
            source_rate = decoded.sample_rate,
            device_rate = self.config.sample_rate.0,
            samples = samples.len(),
            "playing synthesized audio"
        );
        self.play_samples(&samples).await
    }

    fn teardown(&mut self) {
        self.clear_queue();
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio playback released");
        }
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.teardown();
    }
}
