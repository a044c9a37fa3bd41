//! TOML configuration file loading
//!
//! Supports `~/.config/voice-agent/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AgentConfigFile {
    /// System prompt installed as the first conversation turn
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// API endpoint and credential
    #[serde(default)]
    pub api: ApiFileConfig,

    /// Remote model identifiers
    #[serde(default)]
    pub models: ModelsFileConfig,

    /// Chat completion sampling parameters
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Microphone capture parameters
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Speech output parameters
    #[serde(default)]
    pub voice: VoiceFileConfig,
}

/// API endpoint configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiFileConfig {
    pub key: Option<String>,
    pub base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

/// Model identifiers for the three remote services
#[derive(Debug, Default, Deserialize)]
pub struct ModelsFileConfig {
    /// Chat model (e.g. "gpt-4o-mini")
    pub chat: Option<String>,

    /// Transcription model (e.g. "whisper-1")
    pub transcription: Option<String>,

    /// Synthesis model (e.g. "tts-1")
    pub synthesis: Option<String>,
}

/// Chat completion parameters
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

/// Capture parameters
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Recording length in seconds
    pub record_secs: Option<f32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    /// Frames per captured chunk
    pub chunk_size: Option<usize>,
}

/// Speech output configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// TTS voice identifier (e.g. "alloy")
    pub voice: Option<String>,

    /// TTS speed multiplier
    pub speed: Option<f32>,

    /// Container requested from TTS ("wav" or "mp3")
    pub format: Option<String>,

    /// Playback device sample rate
    pub playback_sample_rate: Option<u32>,

    /// End the session when the transcript says "exit"
    pub spoken_exit: Option<bool>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AgentConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> AgentConfigFile {
    config_file_path().map_or_else(AgentConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Returns `AgentConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file_from(path: &Path) -> AgentConfigFile {
    if !path.exists() {
        return AgentConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AgentConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AgentConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/voice-agent/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voice-agent").join("config.toml"))
}
