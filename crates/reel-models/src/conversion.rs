//! Aspect ratio conversion jobs.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::aspect_ratio::AspectRatio;
use crate::collection::{Collection, Entity};
use crate::ids::{ConversionJobId, RequestId};
use crate::status::ConversionStatus;

/// Converts every upload of a request into assets of one target ratio.
///
/// There is one job per distinct aspect ratio across a request's formats.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AspectRatioConversionJob {
    pub id: ConversionJobId,
    pub request_id: RequestId,
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub status: ConversionStatus,
    #[serde(default)]
    pub conversion_attempts: u32,
    #[serde(default)]
    pub conversion_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conversion_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conversion_duration: Option<f64>,
    #[serde(default)]
    pub lease_expires_at_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl AspectRatioConversionJob {
    pub fn new(request_id: RequestId, aspect_ratio: AspectRatio) -> Self {
        Self {
            id: ConversionJobId::new(),
            request_id,
            aspect_ratio,
            status: ConversionStatus::Pending,
            conversion_attempts: 0,
            conversion_start_time: None,
            conversion_end_time: None,
            conversion_duration: None,
            lease_expires_at_ms: None,
            created_at: Utc::now(),
        }
    }
}

impl Entity for AspectRatioConversionJob {
    const COLLECTION: Collection = Collection::ConversionJobs;

    fn id_str(&self) -> &str {
        self.id.as_str()
    }
}
