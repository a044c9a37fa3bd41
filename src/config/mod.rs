//! Configuration management for the voice agent
//!
//! Settings are resolved once at startup with priority env > TOML file >
//! default, then validated. The resulting [`Config`] is immutable for the
//! lifetime of the session.

pub mod file;

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::services::AudioContainer;
use crate::{Error, Result};

use file::AgentConfigFile;

/// Default chat model
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Default transcription model
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Default synthesis model
pub const DEFAULT_SYNTHESIS_MODEL: &str = "tts-1";

/// Default system prompt
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful voice assistant. Keep your responses concise and natural for voice interaction.";

/// Default OpenAI-compatible API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Voice agent configuration
#[derive(Debug)]
pub struct Config {
    /// API endpoint and credential
    pub api: ApiConfig,

    /// Remote model identifiers
    pub models: ModelConfig,

    /// System prompt installed as the first turn of every session
    pub system_prompt: String,

    /// Chat completion sampling parameters
    pub chat: ChatConfig,

    /// Microphone capture parameters
    pub audio: AudioConfig,

    /// Speech output parameters
    pub voice: VoiceConfig,
}

/// API endpoint configuration
#[derive(Debug)]
pub struct ApiConfig {
    /// API credential (never printed)
    pub key: SecretString,

    /// Base URL for the OpenAI-compatible endpoints, without trailing slash
    pub base_url: String,

    /// Per-request timeout applied to every remote call
    pub request_timeout: Duration,
}

/// Model identifiers for the three remote services
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub chat: String,
    pub transcription: String,
    pub synthesis: String,
}

/// Chat completion sampling parameters
#[derive(Debug, Clone, Copy)]
pub struct ChatConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            temperature: 0.7,
            top_p: 0.8,
        }
    }
}

/// Microphone capture parameters
#[derive(Debug, Clone, Copy)]
pub struct AudioConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Capture channel count
    pub channels: u16,

    /// Frames per captured chunk
    pub chunk_size: usize,

    /// Length of each fixed-duration recording
    pub record_duration: Duration,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            chunk_size: 1024,
            record_duration: Duration::from_secs(5),
        }
    }
}

/// Speech output configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// TTS voice identifier
    pub voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub speed: f32,

    /// Container requested from the synthesis service
    pub format: AudioContainer,

    /// Sample rate the speaker stream is opened at
    pub playback_sample_rate: u32,

    /// End the session when the transcript contains the word "exit"
    pub spoken_exit: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice: "alloy".to_string(),
            speed: 1.0,
            format: AudioContainer::Wav,
            playback_sample_rate: 24_000,
            spoken_exit: true,
        }
    }
}

impl Config {
    /// Load configuration from the environment and the TOML config file
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or a setting is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(|key| std::env::var(key).ok(), fc)
    }

    /// Resolve configuration from an env lookup and a parsed config file
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or a setting is invalid
    pub fn resolve<F>(env: F, fc: AgentConfigFile) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = env("OPENAI_API_KEY")
            .or(fc.api.key)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("OPENAI_API_KEY is not set (export it or add api.key to config.toml)".to_string())
            })?;

        let base_url = env("OPENAI_BASE_URL")
            .or(fc.api.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let timeout_secs = parse_env(&env, "VOICE_AGENT_REQUEST_TIMEOUT_SECS")?
            .or(fc.api.request_timeout_secs)
            .unwrap_or(60);

        let api = ApiConfig {
            key: SecretString::from(key),
            base_url,
            request_timeout: Duration::from_secs(timeout_secs),
        };

        let models = ModelConfig {
            chat: env("VOICE_AGENT_CHAT_MODEL")
                .or(fc.models.chat)
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            transcription: env("VOICE_AGENT_STT_MODEL")
                .or(fc.models.transcription)
                .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_MODEL.to_string()),
            synthesis: env("VOICE_AGENT_TTS_MODEL")
                .or(fc.models.synthesis)
                .unwrap_or_else(|| DEFAULT_SYNTHESIS_MODEL.to_string()),
        };

        let system_prompt = env("VOICE_AGENT_SYSTEM_PROMPT")
            .or(fc.system_prompt)
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let chat_default = ChatConfig::default();
        let chat = ChatConfig {
            max_tokens: fc.chat.max_tokens.unwrap_or(chat_default.max_tokens),
            temperature: fc.chat.temperature.unwrap_or(chat_default.temperature),
            top_p: fc.chat.top_p.unwrap_or(chat_default.top_p),
        };

        let audio_default = AudioConfig::default();
        let record_secs = parse_env(&env, "VOICE_AGENT_RECORD_SECS")?.or(fc.audio.record_secs);
        let record_duration = match record_secs {
            Some(secs) => record_duration_from_secs(secs)?,
            None => audio_default.record_duration,
        };
        let audio = AudioConfig {
            sample_rate: parse_env(&env, "VOICE_AGENT_SAMPLE_RATE")?
                .or(fc.audio.sample_rate)
                .unwrap_or(audio_default.sample_rate),
            channels: parse_env(&env, "VOICE_AGENT_CHANNELS")?
                .or(fc.audio.channels)
                .unwrap_or(audio_default.channels),
            chunk_size: fc.audio.chunk_size.unwrap_or(audio_default.chunk_size),
            record_duration,
        };

        let voice_default = VoiceConfig::default();
        let format = match fc.voice.format {
            Some(f) => f.parse()?,
            None => voice_default.format,
        };
        let voice = VoiceConfig {
            voice: env("VOICE_AGENT_TTS_VOICE")
                .or(fc.voice.voice)
                .unwrap_or(voice_default.voice),
            speed: fc.voice.speed.unwrap_or(voice_default.speed),
            format,
            playback_sample_rate: fc
                .voice
                .playback_sample_rate
                .unwrap_or(voice_default.playback_sample_rate),
            spoken_exit: fc.voice.spoken_exit.unwrap_or(voice_default.spoken_exit),
        };

        let config = Self {
            api,
            models,
            system_prompt,
            chat,
            audio,
            voice,
        };
        config.validate()?;

        tracing::debug!(
            chat_model = %config.models.chat,
            stt_model = %config.models.transcription,
            tts_model = %config.models.synthesis,
            record_secs = config.audio.record_duration.as_secs_f32(),
            sample_rate = config.audio.sample_rate,
            channels = config.audio.channels,
            "configuration resolved"
        );

        Ok(config)
    }

    /// Check value ranges that the services and devices depend on
    fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be positive".to_string()));
        }
        if self.audio.channels == 0 {
            return Err(Error::Config("audio.channels must be positive".to_string()));
        }
        if self.audio.chunk_size == 0 {
            return Err(Error::Config("audio.chunk_size must be positive".to_string()));
        }
        if self.voice.playback_sample_rate == 0 {
            return Err(Error::Config(
                "voice.playback_sample_rate must be positive".to_string(),
            ));
        }
        if !(0.25..=4.0).contains(&self.voice.speed) {
            return Err(Error::Config(format!(
                "voice.speed must be between 0.25 and 4.0, got {}",
                self.voice.speed
            )));
        }
        if !(0.0..=2.0).contains(&self.chat.temperature) {
            return Err(Error::Config(format!(
                "chat.temperature must be between 0 and 2, got {}",
                self.chat.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.chat.top_p) {
            return Err(Error::Config(format!(
                "chat.top_p must be between 0 and 1, got {}",
                self.chat.top_p
            )));
        }
        if self.chat.max_tokens == 0 {
            return Err(Error::Config("chat.max_tokens must be positive".to_string()));
        }
        if self.api.request_timeout.is_zero() {
            return Err(Error::Config(
                "api.request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Convert a configured recording length to a non-zero duration
fn record_duration_from_secs(secs: f32) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(Error::Config(format!(
            "recording duration must be a positive number of seconds, got {secs}"
        )));
    }
    Duration::try_from_secs_f32(secs)
        .map_err(|e| Error::Config(format!("invalid recording duration {secs}: {e}")))
}

/// Parse an optional env var, treating an unparsable value as a config error
fn parse_env<T, F>(env: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("{key}={raw:?} is invalid: {e}")))
        })
        .transpose()
}
