//! Aspect-ratio-specific renditions of uploads.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::aspect_ratio::AspectRatio;
use crate::collection::{Collection, Entity};
use crate::ids::{AssetId, RequestId, UploadId};
use crate::metadata::MediaMetadata;
use crate::status::AssetStatus;
use crate::upload::Upload;

/// A converted asset. Created only by the conversion stage and never updated.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Asset {
    pub id: AssetId,
    pub request_id: RequestId,
    pub upload_id: UploadId,
    pub aspect_ratio: AspectRatio,
    pub filename: String,
    pub file_extension: String,
    pub filename_without_extension: String,
    pub file_path: String,
    pub mime_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub processed: bool,
    #[serde(default)]
    pub status: AssetStatus,
    pub metadata: MediaMetadata,
    pub conversion_start_time: DateTime<Utc>,
    pub conversion_end_time: DateTime<Utc>,
    pub conversion_duration: f64,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    /// Asset filename stem for an upload converted to `aspect_ratio`:
    /// `{stem}-{content_type}-{aspect_ratio}`.
    pub fn stem_for(upload: &Upload, aspect_ratio: AspectRatio) -> String {
        format!(
            "{}-{}-{}",
            upload.filename_without_extension,
            upload.kind(),
            aspect_ratio
        )
    }

    /// Full asset filename including the upload's extension.
    pub fn filename_for(upload: &Upload, aspect_ratio: AspectRatio) -> String {
        format!("{}{}", Self::stem_for(upload, aspect_ratio), upload.file_extension)
    }

    /// Build an asset from its source upload, inheriting description,
    /// transcript and processed flags.
    pub fn from_upload(
        upload: &Upload,
        aspect_ratio: AspectRatio,
        file_path: impl Into<String>,
        metadata: MediaMetadata,
        conversion_start_time: DateTime<Utc>,
    ) -> Self {
        let conversion_end_time = Utc::now();
        let conversion_duration =
            (conversion_end_time - conversion_start_time).num_milliseconds() as f64 / 1000.0;

        Self {
            id: AssetId::new(),
            request_id: upload.request_id.clone(),
            upload_id: upload.id.clone(),
            aspect_ratio,
            filename: Self::filename_for(upload, aspect_ratio),
            file_extension: upload.file_extension.clone(),
            filename_without_extension: Self::stem_for(upload, aspect_ratio),
            file_path: file_path.into(),
            mime_type: upload.mime_type.clone(),
            description: upload.description.clone(),
            transcript: upload.transcript.clone(),
            processed: upload.processed,
            status: AssetStatus::Converted,
            metadata,
            conversion_start_time,
            conversion_end_time,
            conversion_duration,
            created_at: conversion_end_time,
        }
    }

    /// True when this is a video asset with speech that scene expansion splits out.
    pub fn has_usable_transcript(&self) -> bool {
        self.metadata.is_video() && !self.transcript.trim().is_empty()
    }
}

impl Entity for Asset {
    const COLLECTION: Collection = Collection::Assets;

    fn id_str(&self) -> &str {
        self.id.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::VideoMetadata;

    #[test]
    fn test_asset_filename() {
        let upload = Upload::new(
            RequestId::from_string("req-1"),
            "interview.mp4",
            "video/mp4",
            "media/req-1/interview.mp4",
        )
        .unwrap();

        assert_eq!(
            Asset::filename_for(&upload, AspectRatio::Portrait),
            "interview-video-9x16.mp4"
        );
    }

    #[test]
    fn test_from_upload_inherits_text() {
        let mut upload = Upload::new(
            RequestId::from_string("req-1"),
            "interview.mp4",
            "video/mp4",
            "media/req-1/interview.mp4",
        )
        .unwrap();
        upload.transcript = "We opened in 2019.".to_string();
        upload.description = "Owner talking to camera".to_string();

        let asset = Asset::from_upload(
            &upload,
            AspectRatio::Square,
            "media/req-1/assets/1x1/interview-video-1x1.mp4",
            MediaMetadata::Video(VideoMetadata::default()),
            Utc::now(),
        );

        assert_eq!(asset.transcript, upload.transcript);
        assert_eq!(asset.description, upload.description);
        assert_eq!(asset.upload_id, upload.id);
        assert!(asset.has_usable_transcript());
    }
}
