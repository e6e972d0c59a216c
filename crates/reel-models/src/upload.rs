//! Raw user uploads.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::collection::{Collection, Entity};
use crate::error::{ModelError, ModelResult};
use crate::ids::{RequestId, UploadId};
use crate::metadata::{MediaKind, MediaMetadata};
use crate::status::UploadStatus;

/// A raw media file submitted for a request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Upload {
    pub id: UploadId,
    pub request_id: RequestId,
    pub filename: String,
    /// Extension including the leading dot, or empty
    pub file_extension: String,
    pub filename_without_extension: String,
    pub file_path: String,
    /// MIME type reported at upload time
    pub mime_type: String,
    pub metadata: MediaMetadata,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub processed: bool,
    #[serde(default)]
    pub status: UploadStatus,
    #[serde(default)]
    pub description_attempts: u32,
    #[serde(default)]
    pub description_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description_duration: Option<f64>,
    #[serde(default)]
    pub lease_expires_at_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Upload {
    /// Build an upload record, detecting kind, extension and stem from the
    /// filename and MIME type.
    pub fn new(
        request_id: RequestId,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        file_path: impl Into<String>,
    ) -> ModelResult<Self> {
        let filename = filename.into();
        let mime_type = mime_type.into();
        let path = Path::new(&filename);

        let file_extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let filename_without_extension = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| filename.clone());

        let kind = MediaKind::detect(&mime_type, &file_extension)
            .ok_or_else(|| ModelError::UnsupportedContentType(mime_type.clone()))?;

        Ok(Self {
            id: UploadId::new(),
            request_id,
            filename,
            file_extension,
            filename_without_extension,
            file_path: file_path.into(),
            mime_type,
            metadata: MediaMetadata::for_kind(kind),
            description: String::new(),
            transcript: String::new(),
            processed: false,
            status: UploadStatus::Uploaded,
            description_attempts: 0,
            description_start_time: None,
            description_end_time: None,
            description_duration: None,
            lease_expires_at_ms: None,
            created_at: Utc::now(),
        })
    }

    pub fn kind(&self) -> MediaKind {
        self.metadata.kind()
    }
}

impl Entity for Upload {
    const COLLECTION: Collection = Collection::Uploads;

    fn id_str(&self) -> &str {
        self.id.as_str()
    }
}
