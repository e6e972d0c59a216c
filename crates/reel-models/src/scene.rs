//! Scene nodes.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::aspect_ratio::AspectRatio;
use crate::collection::{Collection, Entity};
use crate::ids::{RequestId, SceneId, VideoJobId};
use crate::status::SceneStatus;
use crate::video::VideoJob;

/// Narration of the synthetic closing scene.
pub const OUTRO_NARRATION: &str = "Thank you for watching!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SceneType {
    Title,
    Body,
    HasSpeech,
    MiddleTitle,
    Outro,
}

impl SceneType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SceneType::Title => "title",
            SceneType::Body => "body",
            SceneType::HasSpeech => "has_speech",
            SceneType::MiddleTitle => "middle_title",
            SceneType::Outro => "outro",
        }
    }

    /// Title-like scenes render as a static card instead of footage.
    pub fn is_card(&self) -> bool {
        matches!(
            self,
            SceneType::Title | SceneType::MiddleTitle | SceneType::Outro
        )
    }
}

impl fmt::Display for SceneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One node of a video's doubly-linked scene list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    pub id: SceneId,
    pub video_id: VideoJobId,
    pub request_id: RequestId,
    pub aspect_ratio: AspectRatio,
    pub scene_type: SceneType,
    pub narration: String,
    #[serde(default)]
    pub asset_filenames: Vec<String>,
    #[serde(default)]
    pub status: SceneStatus,
    #[serde(default)]
    pub prev_scene_id: Option<SceneId>,
    #[serde(default)]
    pub next_scene_id: Option<SceneId>,
    #[serde(default)]
    pub narration_audio_filename: Option<String>,
    /// Narration (or speech clip) duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub generated_scene_video: Option<String>,
    #[serde(default)]
    pub scene_narration_attempts: u32,
    #[serde(default)]
    pub scene_narration_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scene_narration_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scene_narration_duration: Option<f64>,
    #[serde(default)]
    pub lease_expires_at_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Scene {
    /// New unlinked scene for a video, awaiting narration.
    pub fn new(
        video: &VideoJob,
        scene_type: SceneType,
        narration: impl Into<String>,
        asset_filenames: Vec<String>,
    ) -> Self {
        Self {
            id: SceneId::new(),
            video_id: video.id.clone(),
            request_id: video.request_id.clone(),
            aspect_ratio: video.aspect_ratio,
            scene_type,
            narration: narration.into(),
            asset_filenames,
            status: SceneStatus::Generated,
            prev_scene_id: None,
            next_scene_id: None,
            narration_audio_filename: None,
            duration: None,
            generated_scene_video: None,
            scene_narration_attempts: 0,
            scene_narration_start_time: None,
            scene_narration_end_time: None,
            scene_narration_duration: None,
            lease_expires_at_ms: None,
            created_at: Utc::now(),
        }
    }

    /// A `has_speech` sibling carrying a video asset's own speech.
    ///
    /// The node is already narrated: its narration is the transcript and its
    /// duration is the clip's duration.
    pub fn speech_split(
        source: &Scene,
        asset_filename: impl Into<String>,
        transcript: impl Into<String>,
        duration: Option<f64>,
    ) -> Self {
        Self {
            id: SceneId::new(),
            video_id: source.video_id.clone(),
            request_id: source.request_id.clone(),
            aspect_ratio: source.aspect_ratio,
            scene_type: SceneType::HasSpeech,
            narration: transcript.into(),
            asset_filenames: vec![asset_filename.into()],
            status: SceneStatus::NarrationComplete,
            prev_scene_id: None,
            next_scene_id: None,
            narration_audio_filename: None,
            duration,
            generated_scene_video: None,
            scene_narration_attempts: 0,
            scene_narration_start_time: None,
            scene_narration_end_time: None,
            scene_narration_duration: None,
            lease_expires_at_ms: None,
            created_at: Utc::now(),
        }
    }
}

impl Entity for Scene {
    const COLLECTION: Collection = Collection::Scenes;

    fn id_str(&self) -> &str {
        self.id.as_str()
    }
}
