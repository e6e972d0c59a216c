//! External collaborators the stages call.
//!
//! Stages only see these traits. Production wires them to FFmpeg and the AI
//! provider clients; tests plug in fakes that write placeholder files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reel_ai::{
    ExtractedScenes, GeminiClient, SpeechClient, TitleAndScript, TranscriptionClient,
};
use reel_media::{BodyClip, CropMode, MediaInfo, TitleCard};
use reel_models::{AspectRatio, Asset, MediaKind, VideoJob};

use crate::error::WorkerResult;

/// Letterbox colour for contained conversions.
const CONVERT_BACKGROUND: &str = "black";

#[async_trait]
pub trait MediaService: Send + Sync {
    async fn probe(&self, path: &Path) -> WorkerResult<MediaInfo>;

    /// Duration of an audio or video file in seconds.
    async fn duration(&self, path: &Path) -> WorkerResult<f64>;

    /// Fit `input` to the canvas of `ratio`, writing `output`.
    async fn convert(&self, input: &Path, output: &Path, kind: MediaKind, ratio: AspectRatio) -> WorkerResult<()>;

    async fn extract_frames(&self, input: &Path, out_dir: &Path, interval_secs: f64) -> WorkerResult<Vec<PathBuf>>;

    async fn render_body(&self, clip: &BodyClip, output: &Path) -> WorkerResult<()>;

    async fn render_title_card(&self, card: &TitleCard, output: &Path) -> WorkerResult<()>;

    async fn concatenate(&self, inputs: &[PathBuf], output: &Path, fade_secs: f64) -> WorkerResult<()>;
}

#[async_trait]
pub trait AiService: Send + Sync {
    async fn transcribe(&self, path: &Path, content_type: &str) -> WorkerResult<String>;

    async fn describe_image(&self, path: &Path, context: &str) -> WorkerResult<String>;

    async fn describe_frames(&self, frames: &[PathBuf]) -> WorkerResult<String>;

    async fn is_logo(&self, path: &Path) -> WorkerResult<bool>;

    async fn is_profile_pic(&self, path: &Path) -> WorkerResult<bool>;

    async fn transcript_has_speech(&self, transcript: &str) -> WorkerResult<bool>;

    /// Condense per-frame descriptions into one description of the clip.
    async fn summarize_description(&self, description: &str, transcript: &str, duration: f64) -> WorkerResult<String>;

    /// Clean up a raw transcript using the clip description as context.
    async fn tidy_transcript(&self, description: &str, transcript: &str, duration: f64) -> WorkerResult<String>;

    async fn generate_title_and_script(&self, video: &VideoJob, assets: &[Asset]) -> WorkerResult<TitleAndScript>;

    async fn extract_scenes(&self, title: &str, script: &str, assets: &[Asset]) -> WorkerResult<ExtractedScenes>;

    /// Write synthesized narration for `text` to `output`.
    async fn synthesize_speech(&self, text: &str, output: &Path) -> WorkerResult<()>;
}

/// FFmpeg-backed media operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegMedia;

#[async_trait]
impl MediaService for FfmpegMedia {
    async fn probe(&self, path: &Path) -> WorkerResult<MediaInfo> {
        Ok(reel_media::probe_media(path).await?)
    }

    async fn duration(&self, path: &Path) -> WorkerResult<f64> {
        Ok(reel_media::get_duration(path).await?)
    }

    async fn convert(&self, input: &Path, output: &Path, kind: MediaKind, ratio: AspectRatio) -> WorkerResult<()> {
        let settings = ratio.settings();
        reel_media::convert_to_aspect_ratio(
            input,
            output,
            kind,
            settings.screen_width,
            settings.screen_height,
            CropMode::for_kind(kind),
            CONVERT_BACKGROUND,
        )
        .await?;
        Ok(())
    }

    async fn extract_frames(&self, input: &Path, out_dir: &Path, interval_secs: f64) -> WorkerResult<Vec<PathBuf>> {
        Ok(reel_media::extract_frames(input, out_dir, interval_secs).await?)
    }

    async fn render_body(&self, clip: &BodyClip, output: &Path) -> WorkerResult<()> {
        Ok(reel_media::render_body(clip, output).await?)
    }

    async fn render_title_card(&self, card: &TitleCard, output: &Path) -> WorkerResult<()> {
        Ok(reel_media::render_title_card(card, output).await?)
    }

    async fn concatenate(&self, inputs: &[PathBuf], output: &Path, fade_secs: f64) -> WorkerResult<()> {
        Ok(reel_media::concatenate(inputs, output, fade_secs).await?)
    }
}

/// Gemini, ElevenLabs and Deepgram behind one service.
#[derive(Clone)]
pub struct ProviderAi {
    gemini: GeminiClient,
    speech: SpeechClient,
    transcription: TranscriptionClient,
}

impl ProviderAi {
    pub fn new(gemini: GeminiClient, speech: SpeechClient, transcription: TranscriptionClient) -> Self {
        Self {
            gemini,
            speech,
            transcription,
        }
    }

    /// Build every client from its environment configuration.
    pub fn from_env() -> WorkerResult<Self> {
        Ok(Self::new(
            GeminiClient::from_env()?,
            SpeechClient::from_env()?,
            TranscriptionClient::from_env()?,
        ))
    }
}

#[async_trait]
impl AiService for ProviderAi {
    async fn transcribe(&self, path: &Path, content_type: &str) -> WorkerResult<String> {
        Ok(self.transcription.transcribe(path, content_type).await?)
    }

    async fn describe_image(&self, path: &Path, context: &str) -> WorkerResult<String> {
        Ok(self.gemini.describe_image(path, context).await?)
    }

    async fn describe_frames(&self, frames: &[PathBuf]) -> WorkerResult<String> {
        Ok(self.gemini.describe_frames(frames).await?)
    }

    async fn is_logo(&self, path: &Path) -> WorkerResult<bool> {
        Ok(self.gemini.is_logo(path).await?)
    }

    async fn is_profile_pic(&self, path: &Path) -> WorkerResult<bool> {
        Ok(self.gemini.is_profile_pic(path).await?)
    }

    async fn transcript_has_speech(&self, transcript: &str) -> WorkerResult<bool> {
        Ok(self.gemini.transcript_has_speech(transcript).await?)
    }

    async fn summarize_description(&self, description: &str, transcript: &str, duration: f64) -> WorkerResult<String> {
        Ok(self
            .gemini
            .summarize_description(description, transcript, duration)
            .await?)
    }

    async fn tidy_transcript(&self, description: &str, transcript: &str, duration: f64) -> WorkerResult<String> {
        Ok(self.gemini.tidy_transcript(description, transcript, duration).await?)
    }

    async fn generate_title_and_script(&self, video: &VideoJob, assets: &[Asset]) -> WorkerResult<TitleAndScript> {
        Ok(self.gemini.generate_title_and_script(video, assets).await?)
    }

    async fn extract_scenes(&self, title: &str, script: &str, assets: &[Asset]) -> WorkerResult<ExtractedScenes> {
        Ok(self.gemini.extract_scenes(title, script, assets).await?)
    }

    async fn synthesize_speech(&self, text: &str, output: &Path) -> WorkerResult<()> {
        Ok(self.speech.synthesize_speech(text, output).await?)
    }
}
