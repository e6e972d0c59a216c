//! Video jobs: one per request format.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::aspect_ratio::AspectRatio;
use crate::collection::{Collection, Entity};
use crate::ids::{FormatId, RequestId, VideoJobId};
use crate::request::{FormatSpec, VideoRequest};
use crate::status::VideoJobStatus;

/// A single output video for one {request, format} pair.
///
/// Language, topic and style are denormalized from the request so the script
/// stages do not need to load it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoJob {
    pub id: VideoJobId,
    pub request_id: RequestId,
    #[serde(default)]
    pub format_id: Option<FormatId>,
    pub aspect_ratio: AspectRatio,
    /// Target length in seconds
    pub length: u32,
    pub lang: String,
    pub topic: String,
    pub style: String,
    #[serde(default)]
    pub status: VideoJobStatus,

    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub script_generated: bool,
    #[serde(default)]
    pub script_generation_attempts: u32,
    #[serde(default)]
    pub script_generation_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub script_generation_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub script_generation_duration: Option<f64>,

    #[serde(default)]
    pub scene_extraction_attempts: u32,
    #[serde(default)]
    pub scene_extraction_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scene_extraction_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scene_extraction_duration: Option<f64>,

    #[serde(default)]
    pub render_attempts: u32,
    #[serde(default)]
    pub render_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub render_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub render_duration: Option<f64>,
    #[serde(default)]
    pub final_cut_path: Option<String>,

    #[serde(default)]
    pub lease_expires_at_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl VideoJob {
    /// Spawn a job for one format of a request.
    ///
    /// The id is derived from `spawn_key` so that a retried spawn writes the
    /// same record instead of a duplicate.
    pub fn spawn(request: &VideoRequest, format: FormatSpec, spawn_key: &str) -> Self {
        Self {
            id: VideoJobId::from_string(format!("{}-{}", request.id, spawn_key)),
            request_id: request.id.clone(),
            format_id: None,
            aspect_ratio: format.aspect_ratio,
            length: format.length,
            lang: request.lang.clone(),
            topic: request.topic.clone(),
            style: request.style.clone(),
            status: VideoJobStatus::Requested,
            title: None,
            script: None,
            script_generated: false,
            script_generation_attempts: 0,
            script_generation_start_time: None,
            script_generation_end_time: None,
            script_generation_duration: None,
            scene_extraction_attempts: 0,
            scene_extraction_start_time: None,
            scene_extraction_end_time: None,
            scene_extraction_duration: None,
            render_attempts: 0,
            render_start_time: None,
            render_end_time: None,
            render_duration: None,
            final_cut_path: None,
            lease_expires_at_ms: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_format_id(mut self, format_id: FormatId) -> Self {
        self.format_id = Some(format_id);
        self
    }

    /// Narration word budget: 2.5 words per second, rounded up.
    pub fn target_word_count(&self) -> u32 {
        (2.5 * self.length as f64).ceil() as u32
    }
}

impl Entity for VideoJob {
    const COLLECTION: Collection = Collection::Videos;

    fn id_str(&self) -> &str {
        self.id.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_word_count_rounds_up() {
        let request = VideoRequest::new("en", "topic", "promo");
        let job = VideoJob::spawn(&request, FormatSpec::new(AspectRatio::Portrait, 15), "0");
        assert_eq!(job.target_word_count(), 38);

        let job = VideoJob::spawn(&request, FormatSpec::new(AspectRatio::Portrait, 30), "0");
        assert_eq!(job.target_word_count(), 75);
    }

    #[test]
    fn test_spawn_is_deterministic_per_key() {
        let request = VideoRequest::new("en", "topic", "promo");
        let a = VideoJob::spawn(&request, FormatSpec::new(AspectRatio::Square, 30), "1");
        let b = VideoJob::spawn(&request, FormatSpec::new(AspectRatio::Square, 30), "1");
        assert_eq!(a.id, b.id);
        assert_eq!(a.topic, "topic");
        assert_eq!(a.status, VideoJobStatus::Requested);
    }
}
