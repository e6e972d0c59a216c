//! Video requests and their per-format spawning records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::aspect_ratio::AspectRatio;
use crate::collection::{Collection, Entity};
use crate::ids::{FormatId, RequestId};
use crate::status::{FormatStatus, RequestStatus};

/// One requested output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct FormatSpec {
    pub aspect_ratio: AspectRatio,
    /// Target length in seconds
    pub length: u32,
}

impl FormatSpec {
    pub fn new(aspect_ratio: AspectRatio, length: u32) -> Self {
        Self {
            aspect_ratio,
            length,
        }
    }
}

/// Top-level user submission.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoRequest {
    pub id: RequestId,
    pub lang: String,
    pub topic: String,
    pub style: String,
    #[serde(default)]
    pub brand_link: Option<String>,
    pub formats: Vec<FormatSpec>,
    #[serde(default)]
    pub status: RequestStatus,
    #[serde(default)]
    pub spawning_attempts: u32,
    #[serde(default)]
    pub spawning_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub spawning_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub spawning_duration: Option<f64>,
    #[serde(default)]
    pub lease_expires_at_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl VideoRequest {
    pub fn new(lang: impl Into<String>, topic: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            lang: lang.into(),
            topic: topic.into(),
            style: style.into(),
            brand_link: None,
            formats: Vec::new(),
            status: RequestStatus::Pending,
            spawning_attempts: 0,
            spawning_start_time: None,
            spawning_end_time: None,
            spawning_duration: None,
            lease_expires_at_ms: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_brand_link(mut self, link: impl Into<String>) -> Self {
        self.brand_link = Some(link.into());
        self
    }

    pub fn with_format(mut self, format: FormatSpec) -> Self {
        self.formats.push(format);
        self
    }

    /// Distinct aspect ratios across the requested formats, in first-seen order.
    pub fn distinct_aspect_ratios(&self) -> Vec<AspectRatio> {
        let mut seen = Vec::new();
        for f in &self.formats {
            if !seen.contains(&f.aspect_ratio) {
                seen.push(f.aspect_ratio);
            }
        }
        seen
    }
}

impl Entity for VideoRequest {
    const COLLECTION: Collection = Collection::VideoRequests;

    fn id_str(&self) -> &str {
        self.id.as_str()
    }
}

/// Per-format record polled by the format-level spawning variant.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoRequestFormat {
    pub id: FormatId,
    pub request_id: RequestId,
    pub aspect_ratio: AspectRatio,
    pub length: u32,
    #[serde(default)]
    pub status: FormatStatus,
    #[serde(default)]
    pub spawning_attempts: u32,
    #[serde(default)]
    pub spawning_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub spawning_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub spawning_duration: Option<f64>,
    #[serde(default)]
    pub lease_expires_at_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl VideoRequestFormat {
    pub fn new(request_id: RequestId, format: FormatSpec) -> Self {
        Self {
            id: FormatId::new(),
            request_id,
            aspect_ratio: format.aspect_ratio,
            length: format.length,
            status: FormatStatus::Pending,
            spawning_attempts: 0,
            spawning_start_time: None,
            spawning_end_time: None,
            spawning_duration: None,
            lease_expires_at_ms: None,
            created_at: Utc::now(),
        }
    }
}

impl Entity for VideoRequestFormat {
    const COLLECTION: Collection = Collection::VideoRequestFormats;

    fn id_str(&self) -> &str {
        self.id.as_str()
    }
}
