//! Deepgram speech-to-text.

use std::path::Path;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AiError, AiResult};
use crate::metrics::record_request;

pub const DEFAULT_BASE_URL: &str = "https://api.deepgram.com";

/// Transcripts this short are noise, not speech.
pub const MIN_SPEECH_CHARS: usize = 7;

#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub language: String,
    pub timeout: Duration,
}

impl TranscriptionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "nova-2".to_string(),
            language: "en".to_string(),
            timeout: Duration::from_secs(300),
        }
    }

    /// Read `DEEPGRAM_API_KEY` and optional `DEEPGRAM_MODEL`,
    /// `DEEPGRAM_LANGUAGE` and `DEEPGRAM_BASE_URL`.
    pub fn from_env() -> AiResult<Self> {
        let api_key = std::env::var("DEEPGRAM_API_KEY").map_err(|_| AiError::MissingApiKey("DEEPGRAM_API_KEY"))?;
        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var("DEEPGRAM_MODEL") {
            config.model = model;
        }
        if let Ok(language) = std::env::var("DEEPGRAM_LANGUAGE") {
            config.language = language;
        }
        if let Ok(url) = std::env::var("DEEPGRAM_BASE_URL") {
            config.base_url = url;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

#[derive(Clone)]
pub struct TranscriptionClient {
    config: TranscriptionConfig,
    client: Client,
}

impl TranscriptionClient {
    pub fn new(config: TranscriptionConfig) -> AiResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> AiResult<Self> {
        Self::new(TranscriptionConfig::from_env()?)
    }

    /// Transcribe the audio track of a media file. Silent media yields an
    /// empty transcript, not an error.
    pub async fn transcribe(&self, path: &Path, content_type: &str) -> AiResult<String> {
        let body = tokio::fs::read(path).await?;
        let url = format!("{}/v1/listen", self.config.base_url.trim_end_matches('/'));

        let started = Instant::now();
        let result = self.listen(&url, content_type, body).await;
        record_request("deepgram", &self.config.model, result.is_ok(), started.elapsed().as_secs_f64());

        let transcript = result?;
        debug!(path = %path.display(), chars = transcript.len(), "Transcribed media");
        Ok(transcript)
    }

    async fn listen(&self, url: &str, content_type: &str, body: Vec<u8>) -> AiResult<String> {
        let response = self
            .client
            .post(url)
            .query(&[
                ("smart_format", "true"),
                ("language", self.config.language.as_str()),
                ("model", self.config.model.as_str()),
                ("diarize", "true"),
                ("punctuate", "true"),
                ("utterances", "true"),
            ])
            .header("Authorization", format!("Token {}", self.config.api_key))
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AiError::api("deepgram", status, error_text));
        }

        let parsed: ListenResponse = response.json().await?;
        Ok(parsed
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript.trim().to_string())
            .unwrap_or_default())
    }
}

/// Cheap pre-check before asking a model whether a transcript is speech.
pub fn long_enough_for_speech(transcript: &str) -> bool {
    transcript.trim().chars().count() > MIN_SPEECH_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_enough_for_speech() {
        assert!(!long_enough_for_speech(""));
        assert!(!long_enough_for_speech("  uh huh "));
        assert!(long_enough_for_speech("hello there"));
    }
}
