//! ElevenLabs text-to-speech.

use std::path::Path;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::error::{AiError, AiResult};
use crate::metrics::record_request;

pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
pub const DEFAULT_VOICE_ID: &str = "nPczCjzI2devNBz1zQrb";
pub const DEFAULT_MODEL_ID: &str = "eleven_turbo_v2";

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub api_key: String,
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub use_speaker_boost: bool,
    pub timeout: Duration,
}

impl SpeechConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            stability: 0.3,
            similarity_boost: 0.75,
            use_speaker_boost: true,
            timeout: Duration::from_secs(120),
        }
    }

    /// Read `ELEVENLABS_API_KEY` and optional `ELEVENLABS_VOICE_ID`,
    /// `ELEVENLABS_MODEL_ID` and `ELEVENLABS_BASE_URL`.
    pub fn from_env() -> AiResult<Self> {
        let api_key =
            std::env::var("ELEVENLABS_API_KEY").map_err(|_| AiError::MissingApiKey("ELEVENLABS_API_KEY"))?;
        let mut config = Self::new(api_key);
        if let Ok(voice) = std::env::var("ELEVENLABS_VOICE_ID") {
            config.voice_id = voice;
        }
        if let Ok(model) = std::env::var("ELEVENLABS_MODEL_ID") {
            config.model_id = model;
        }
        if let Ok(url) = std::env::var("ELEVENLABS_BASE_URL") {
            config.base_url = url;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model_id: &'a str,
    text: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    use_speaker_boost: bool,
}

/// Quotes trip up the voice model, so they are dropped before synthesis.
pub fn clean_narration(text: &str) -> String {
    text.chars().filter(|c| *c != '\'' && *c != '"').collect::<String>().trim().to_string()
}

#[derive(Clone)]
pub struct SpeechClient {
    config: SpeechConfig,
    client: Client,
}

impl SpeechClient {
    pub fn new(config: SpeechConfig) -> AiResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> AiResult<Self> {
        Self::new(SpeechConfig::from_env()?)
    }

    /// Synthesize `text` to an MP3 at `output`.
    pub async fn synthesize_speech(&self, text: &str, output: &Path) -> AiResult<()> {
        let text = clean_narration(text);
        if text.is_empty() {
            return Err(AiError::EmptyResponse("narration text"));
        }

        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.voice_id
        );
        let request = SpeechRequest {
            model_id: &self.config.model_id,
            text: &text,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
                use_speaker_boost: self.config.use_speaker_boost,
            },
        };

        let started = Instant::now();
        let result = self.fetch_audio(&url, &request).await;
        record_request("elevenlabs", &self.config.model_id, result.is_ok(), started.elapsed().as_secs_f64());
        let audio = result?;

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, &audio).await?;

        info!(output = %output.display(), bytes = audio.len(), "Synthesized narration");
        Ok(())
    }

    async fn fetch_audio(&self, url: &str, request: &SpeechRequest<'_>) -> AiResult<Vec<u8>> {
        let response = self
            .client
            .post(url)
            .header("xi-api-key", &self.config.api_key)
            .header("Accept", "audio/mpeg")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AiError::api("elevenlabs", status, error_text));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(AiError::EmptyResponse("elevenlabs"));
        }
        Ok(bytes.to_vec())
    }
}
