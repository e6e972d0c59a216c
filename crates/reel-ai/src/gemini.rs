//! Gemini client for media description, scripting and scene extraction.
//!
//! Every call walks the configured model list in order and returns the
//! first success, so a rate-limited or retired model degrades to the next.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use base64::Engine;
use futures::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;
use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use reel_models::{Asset, VideoJob};

use crate::error::{AiError, AiResult};
use crate::json::extract_json;
use crate::metrics::record_request;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub const DEFAULT_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-flash-lite", "gemini-2.5-pro"];

const EDITOR_PERSONA: &str =
    "You are a video editor screenwriting and then cutting a TV news / social media video.";

/// Frames described at once when summarising a video.
const FRAME_CONCURRENCY: usize = 2;

static YES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\byes\b").expect("valid regex"));

/// Gemini client configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    /// Models tried in order
    pub models: Vec<String>,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Read `GEMINI_API_KEY`, plus optional `GEMINI_MODELS` (comma separated)
    /// and `GEMINI_BASE_URL`.
    pub fn from_env() -> AiResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| AiError::MissingApiKey("GEMINI_API_KEY"))?;
        let mut config = Self::new(api_key);

        if let Ok(models) = std::env::var("GEMINI_MODELS") {
            let models: Vec<String> = models
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
            if !models.is_empty() {
                config.models = models;
            }
        }
        if let Ok(url) = std::env::var("GEMINI_BASE_URL") {
            config.base_url = url;
        }
        config.timeout = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.timeout);
        Ok(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    fn image(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// A generated title and voiceover script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TitleAndScript {
    pub title: String,
    pub script: String,
}

/// One scene as returned by the extraction model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedScene {
    /// Narration or voiceover for the scene
    pub narration: String,
    /// Filenames of assets cut to during the scene, if any
    #[serde(default)]
    pub asset_filenames: Vec<String>,
}

/// Scenes extracted from a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedScenes {
    pub title: String,
    pub scenes: Vec<ExtractedScene>,
}

/// What the script prompt sees of a video job.
#[derive(Debug, Serialize)]
struct VideoBrief<'a> {
    topic: &'a str,
    style: &'a str,
    lang: &'a str,
    length_seconds: u32,
    aspect_ratio: &'a str,
}

/// What the script and scene prompts see of a converted asset.
#[derive(Debug, Serialize)]
struct AssetBrief<'a> {
    filename: &'a str,
    content_type: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "is_blank")]
    transcript: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    is_logo: bool,
}

fn is_blank(s: &&str) -> bool {
    s.trim().is_empty()
}

impl<'a> AssetBrief<'a> {
    fn from_asset(asset: &'a Asset) -> Self {
        Self {
            filename: &asset.filename,
            content_type: asset.metadata.kind().as_str(),
            description: &asset.description,
            transcript: &asset.transcript,
            duration: asset.metadata.duration(),
            is_logo: asset.metadata.is_logo(),
        }
    }
}

/// Gemini API client.
#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> AiResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> AiResult<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    /// Describe an image in clipped, keyword-heavy language.
    pub async fn describe_image(&self, path: &Path, context: &str) -> AiResult<String> {
        let prompt = format!(
            "Describe this image very succinctly but descriptively for a TV news / social media script. \
             Feel free to use keywords and clipped language, almost like a prompt for image generation. {}",
            context
        );
        let text = self
            .generate_with_image(path, &prompt, "You are a video editor and you are helping a user edit a video.")
            .await?;
        Ok(text.trim().to_string())
    }

    /// Describe sampled frames of a video and join the descriptions in order.
    pub async fn describe_frames(&self, frames: &[PathBuf]) -> AiResult<String> {
        if frames.is_empty() {
            return Ok(String::new());
        }
        let pending: Vec<_> = frames.iter().map(|frame| self.describe_image(frame, "")).collect();
        let descriptions: Vec<String> = stream::iter(pending)
            .buffered(FRAME_CONCURRENCY)
            .try_collect()
            .await?;
        Ok(format!("{}.", descriptions.join(".\n")))
    }

    pub async fn is_logo(&self, path: &Path) -> AiResult<bool> {
        let answer = self
            .generate_with_image(
                path,
                "Is this image a logo? Please respond with just 'Yes' or 'No'.",
                "You are an image analysis assistant.",
            )
            .await?;
        Ok(is_affirmative(&answer))
    }

    pub async fn is_profile_pic(&self, path: &Path) -> AiResult<bool> {
        let answer = self
            .generate_with_image(
                path,
                "Is this image a profile picture or headshot of a single person? \
                 Please respond with just 'Yes' or 'No'.",
                "You are an image analysis assistant.",
            )
            .await?;
        Ok(is_affirmative(&answer))
    }

    /// Whether a transcript is someone talking to or clearly overheard by the
    /// camera, as opposed to background footage.
    pub async fn transcript_has_speech(&self, transcript: &str) -> AiResult<bool> {
        let prompt = format!(
            "Does the following video segment have speech? Are people talking in it, in a way that \
             needs to be explicitly transcribed?\n\n\
             If the video is a conversation to the camera, and the speakers are talking to the camera \
             or being overheard very clearly by it, the transcript is usable. Otherwise it is \
             background footage, still useful, but the answer should be \"no\".\n\n\
             Answer with a final \"yes\" or \"no\".\n\n\
             Video Transcript: {}\n\nHas Speech?",
            transcript
        );
        let answer = self.generate_text(&prompt, "You are a helpful assistant.", false).await?;
        Ok(is_affirmative(&answer))
    }

    /// Condense frame descriptions and transcript into a short description.
    pub async fn summarize_description(&self, long_description: &str, transcript: &str, duration: f64) -> AiResult<String> {
        let prompt = format!(
            "Please summarize this long description of a {:.1} secs video into something succinct. \
             If there is no transcript, summarize the video description. Do not mention whether \
             there is a transcript.\n\n\
             long_description: {}\n\ntranscript: {}\n\nshort_description:",
            duration, long_description, transcript
        );
        Ok(self.generate_text(&prompt, EDITOR_PERSONA, false).await?.trim().to_string())
    }

    /// Name speakers in a raw transcript where the context allows, adding nothing else.
    pub async fn tidy_transcript(&self, description: &str, raw_transcript: &str, duration: f64) -> AiResult<String> {
        let prompt = format!(
            "Please name speakers in the raw_transcript if their names are anywhere in the context. \
             DO NOT ADD ANY CONTENT.\n\n\
             video_description: {}\nduration: {:.1} seconds\n\n\
             ONLY RETURN THE TRANSCRIPT WITH SPEAKERS NAMED.\n\n\
             raw_transcript: {}\n\ntidy_transcript:",
            description, duration, raw_transcript
        );
        Ok(self.generate_text(&prompt, EDITOR_PERSONA, false).await?.trim().to_string())
    }

    /// Write a title and a narrator/cut-to script for a video job.
    pub async fn generate_title_and_script(&self, video: &VideoJob, assets: &[Asset]) -> AiResult<TitleAndScript> {
        let prompt = script_prompt(video, assets)?;
        let text = self.generate_text(&prompt, EDITOR_PERSONA, true).await?;
        let parsed: TitleAndScript = extract_json(&text)?;
        if parsed.script.trim().is_empty() {
            return Err(AiError::invalid_json("model returned an empty script"));
        }
        Ok(parsed)
    }

    /// Split a script into narrated scenes, each optionally cutting to assets.
    pub async fn extract_scenes(&self, title: &str, script: &str, assets: &[Asset]) -> AiResult<ExtractedScenes> {
        let prompt = scenes_prompt(title, script, assets)?;
        let text = self.generate_text(&prompt, EDITOR_PERSONA, true).await?;
        let mut parsed: ExtractedScenes = extract_json(&text)?;
        parsed.title = title.to_string();
        parsed.scenes.retain(|s| !s.narration.trim().is_empty());
        Ok(parsed)
    }

    /// Text-only generation with model fallback.
    pub async fn generate_text(&self, prompt: &str, system: &str, json: bool) -> AiResult<String> {
        self.with_fallback(|model| {
            let request = GeminiRequest {
                contents: vec![Content {
                    parts: vec![Part::text(prompt)],
                }],
                system_instruction: Some(Content {
                    parts: vec![Part::text(system)],
                }),
                generation_config: GenerationConfig {
                    temperature: 0.0,
                    response_mime_type: json.then(|| "application/json".to_string()),
                    max_output_tokens: None,
                },
            };
            async move { self.call(&model, &request).await }
        })
        .await
    }

    /// Prompt about a single image, with model fallback.
    async fn generate_with_image(&self, path: &Path, prompt: &str, system: &str) -> AiResult<String> {
        let bytes = tokio::fs::read(path).await?;
        let mime = image_mime_type(path);

        self.with_fallback(|model| {
            let request = GeminiRequest {
                contents: vec![Content {
                    parts: vec![Part::image(mime, &bytes), Part::text(prompt)],
                }],
                system_instruction: Some(Content {
                    parts: vec![Part::text(system)],
                }),
                generation_config: GenerationConfig {
                    temperature: 0.0,
                    response_mime_type: None,
                    max_output_tokens: Some(1024),
                },
            };
            async move { self.call(&model, &request).await }
        })
        .await
    }

    async fn with_fallback<F, Fut>(&self, mut attempt: F) -> AiResult<String>
    where
        F: FnMut(String) -> Fut,
        Fut: std::future::Future<Output = AiResult<String>>,
    {
        let mut last_error = None;
        for model in &self.config.models {
            debug!("Attempting Gemini API with model: {}", model);
            match attempt(model.clone()).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!("Failed with model {}: {}", model, e);
                    last_error = Some(e);
                }
            }
        }
        Err(AiError::AllModelsFailed(
            last_error.map(|e| e.to_string()).unwrap_or_else(|| "no models configured".to_string()),
        ))
    }

    async fn call(&self, model: &str, request: &GeminiRequest) -> AiResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.base_url.trim_end_matches('/'),
            model,
            self.config.api_key
        );

        let started = Instant::now();
        let result = self.send(&url, request).await;
        record_request("gemini", model, result.is_ok(), started.elapsed().as_secs_f64());
        if result.is_ok() {
            info!(model = %model, elapsed_ms = started.elapsed().as_millis() as u64, "Gemini call succeeded");
        }
        result
    }

    async fn send(&self, url: &str, request: &GeminiRequest) -> AiResult<String> {
        let response = self.client.post(url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AiError::api("gemini", status, error_text));
        }

        let body: GeminiResponse = response.json().await?;
        body.candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .reduce(|a, b| a + &b)
            .filter(|t| !t.trim().is_empty())
            .ok_or(AiError::EmptyResponse("gemini"))
    }
}

/// Whether a short model answer says yes.
pub fn is_affirmative(answer: &str) -> bool {
    YES.is_match(answer)
}

fn image_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}

fn script_prompt(video: &VideoJob, assets: &[Asset]) -> AiResult<String> {
    let brief = VideoBrief {
        topic: &video.topic,
        style: &video.style,
        lang: &video.lang,
        length_seconds: video.length,
        aspect_ratio: video.aspect_ratio.as_str(),
    };
    let assets: Vec<AssetBrief<'_>> = assets.iter().map(AssetBrief::from_asset).collect();
    let video_json = serde_json::to_string_pretty(&brief).map_err(|e| AiError::invalid_json(e.to_string()))?;
    let assets_json = serde_json::to_string_pretty(&assets).map_err(|e| AiError::invalid_json(e.to_string()))?;

    Ok(format!(
        r#"You're an expert video editor generating a title and script for a social media video for a brand.

Refer to what the company does and to the setting. Be very explicit about the city, landmarks and other distinctive features, as keywords will be mined from the script.

Include Narrator (Voiceover) blocks as well as Cut to: markers. If there are testimonials or other videos with speech among the assets, Cut to: those as well, referring to them by filename.

Keep the script under {words} words. This is for a {length} second {platform} {style}, written in language "{lang}".

The video to edit:
{video_json}

The assets to use:
{assets_json}

Return ONLY a JSON object of the form:
{{"title": "some title for a compelling video", "script": "some script for a compelling video"}}
"#,
        words = video.target_word_count(),
        length = video.length,
        platform = video.aspect_ratio.platform(),
        style = video.style,
        lang = video.lang,
    ))
}

fn scenes_prompt(title: &str, script: &str, assets: &[Asset]) -> AiResult<String> {
    let schema = schemars::schema_for!(ExtractedScenes);
    let schema_json = serde_json::to_string_pretty(&schema).map_err(|e| AiError::invalid_json(e.to_string()))?;
    let filenames: Vec<&str> = assets.iter().map(|a| a.filename.as_str()).collect();

    Ok(format!(
        r#"Generate scenes for a video based on the following script.

Use "Cut to:" as a marker for a new scene or a new "Narrator:" block.

title: {title}
script:
{script}

Each scene has a narration and the asset filenames mentioned for it in the script, if any.
Only use filenames from this list: {filenames:?}

Return ONLY a JSON object matching this schema:
{schema_json}
"#
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{AspectRatio, FormatSpec, VideoRequest};

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("Yes"));
        assert!(is_affirmative("yes."));
        assert!(is_affirmative("After review: YES"));
        assert!(!is_affirmative("No"));
        assert!(!is_affirmative("eyes closed"));
    }

    #[test]
    fn test_image_mime_type() {
        assert_eq!(image_mime_type(Path::new("a.PNG")), "image/png");
        assert_eq!(image_mime_type(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(image_mime_type(Path::new("frame")), "image/jpeg");
    }

    #[test]
    fn test_script_prompt_names_platform_and_word_budget() {
        let request = VideoRequest::new("en", "coffee roastery", "promo");
        let video = VideoJob::spawn(&request, FormatSpec::new(AspectRatio::Landscape, 30), "0");
        let prompt = script_prompt(&video, &[]).unwrap();
        assert!(prompt.contains("under 75 words"));
        assert!(prompt.contains("30 second YouTube promo"));
        assert!(prompt.contains("coffee roastery"));
    }

    #[test]
    fn test_scenes_prompt_embeds_schema() {
        let prompt = scenes_prompt("Title", "Narrator: hello", &[]).unwrap();
        assert!(prompt.contains("asset_filenames"));
        assert!(prompt.contains("Narrator: hello"));
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part::image("image/png", b"abc"), Part::text("hi")],
            }],
            system_instruction: None,
            generation_config: GenerationConfig {
                temperature: 0.0,
                response_mime_type: Some("application/json".into()),
                max_output_tokens: None,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(json["contents"][0]["parts"][0]["inlineData"]["data"], "YWJj");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert!(json.get("systemInstruction").is_none());
    }
}
