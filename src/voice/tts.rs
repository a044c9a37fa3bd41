//! Text-to-speech (TTS) processing

use async_trait::async_trait;

use crate::services::{AudioContainer, Synthesizer};
use crate::{Error, Result};

/// Request body for the speech endpoint
#[derive(serde::Serialize)]
struct TtsRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'a str,
}

/// Synthesizes speech from text via an OpenAI-compatible speech endpoint
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    voice: String,
    speed: f32,
    model: String,
}

impl TextToSpeech {
    /// Create a new TTS client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(
        client: reqwest::Client,
        api_key: String,
        base_url: &str,
        model: String,
        voice: String,
        speed: f32,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/audio/speech", base_url.trim_end_matches('/')),
            voice,
            speed,
            model,
        })
    }

    fn request<'a>(&'a self, text: &'a str, container: AudioContainer) -> TtsRequest<'a> {
        TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: container.as_str(),
        }
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str, container: AudioContainer) -> Result<Vec<u8>> {
        tracing::debug!(chars = text.len(), format = %container, "starting speech synthesis");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request(text, container))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "TTS request failed");
                Error::Synthesis(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "TTS API error");
            return Err(Error::Synthesis(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(format!("failed to read audio body: {e}")))?;

        if audio.is_empty() {
            return Err(Error::Synthesis("TTS returned no audio".to_string()));
        }

        tracing::info!(audio_bytes = audio.len(), "synthesis complete");
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tts() -> TextToSpeech {
        TextToSpeech::new(
            reqwest::Client::new(),
            "sk-test".to_string(),
            "https://api.openai.com/v1",
            "tts-1".to_string(),
            "alloy".to_string(),
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn test_requires_key() {
        let err = TextToSpeech::new(
            reqwest::Client::new(),
            String::new(),
            "https://api.openai.com/v1",
            "tts-1".to_string(),
            "alloy".to_string(),
            1.0,
        );
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_request_body() {
        let tts = tts();
        assert_eq!(tts.endpoint, "https://api.openai.com/v1/audio/speech");

        let body = serde_json::to_value(tts.request("Hello!", AudioContainer::Wav)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "tts-1",
                "input": "Hello!",
                "voice": "alloy",
                "speed": 1.0,
                "response_format": "wav",
            })
        );
    }
}
