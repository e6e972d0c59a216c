//! Aspect ratio conversion: every upload of a request becomes one asset per ratio.

use async_trait::async_trait;
use chrono::Utc;
use reel_media::MediaInfo;
use reel_models::{
    AspectRatio, AspectRatioConversionJob, Asset, ImageMetadata, MediaMetadata, Upload,
    VideoMetadata,
};
use reel_store::Filter;
use std::path::Path;

use crate::context::{path_string, WorkerContext};
use crate::error::WorkerResult;
use crate::logging::RecordLogger;
use crate::stage::{Outcome, Stage};
use crate::stages::described_requests_gate;
use crate::transitions::{StageSpec, CONVERT};

pub struct ConvertStage {
    ctx: WorkerContext,
}

impl ConvertStage {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }

    async fn convert_upload(&self, job: &AspectRatioConversionJob, upload: &Upload) -> WorkerResult<Asset> {
        let started = Utc::now();
        let filename = Asset::filename_for(upload, job.aspect_ratio);
        let output = self.ctx.paths.asset(&job.request_id, job.aspect_ratio, &filename);

        self.ctx
            .media
            .convert(Path::new(&upload.file_path), &output, upload.kind(), job.aspect_ratio)
            .await?;
        let info = self.ctx.media.probe(&output).await?;

        let metadata = converted_metadata(&upload.metadata, &info, job.aspect_ratio);
        Ok(Asset::from_upload(
            upload,
            job.aspect_ratio,
            path_string(&output),
            metadata,
            started,
        ))
    }
}

/// Source metadata with geometry and timing replaced by the converted file's.
pub fn converted_metadata(source: &MediaMetadata, info: &MediaInfo, ratio: AspectRatio) -> MediaMetadata {
    match source {
        MediaMetadata::Image(m) => MediaMetadata::Image(ImageMetadata {
            width: Some(info.width),
            height: Some(info.height),
            aspect_ratio: Some(ratio),
            ..m.clone()
        }),
        MediaMetadata::Video(m) => MediaMetadata::Video(VideoMetadata {
            width: Some(info.width),
            height: Some(info.height),
            aspect_ratio: Some(ratio),
            duration: info.duration.or(m.duration),
            fps: info.fps.or(m.fps),
            has_speech: m.has_speech,
        }),
    }
}

#[async_trait]
impl Stage for ConvertStage {
    fn spec(&self) -> &'static StageSpec {
        &CONVERT
    }

    /// Requests with any upload short of `description_complete` are not claimable.
    async fn eligibility(&self) -> WorkerResult<Option<Filter>> {
        Ok(Some(described_requests_gate(&self.ctx.repo, "request_id").await?))
    }

    async fn process(&self, id: &str) -> WorkerResult<Outcome> {
        let repo = &self.ctx.repo;
        let job: AspectRatioConversionJob = repo.require(id).await?;
        let logger = RecordLogger::new(id, CONVERT.name);

        // Assets left by an earlier failed attempt are replaced.
        let stale = repo
            .delete_where::<Asset>(
                &Filter::eq("request_id", job.request_id.as_str())
                    .and(Filter::eq("aspect_ratio", job.aspect_ratio.as_str())),
            )
            .await?;
        if stale > 0 {
            logger.log_progress(&format!("removed {} assets from a previous attempt", stale));
        }

        let uploads: Vec<Upload> = repo
            .find(&Filter::eq("request_id", job.request_id.as_str()), None)
            .await?;

        // One failed upload fails the whole job attempt.
        for upload in &uploads {
            let asset = self.convert_upload(&job, upload).await?;
            repo.insert(&asset).await?;
            logger.log_progress(&format!("converted {} -> {}", upload.filename, asset.filename));
        }

        logger.log_progress(&format!(
            "{} uploads converted to {}",
            uploads.len(),
            job.aspect_ratio
        ));
        Ok(Outcome::complete())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converted_metadata_keeps_flags() {
        let source = MediaMetadata::Video(VideoMetadata {
            width: Some(1920),
            height: Some(1080),
            aspect_ratio: Some(AspectRatio::Landscape),
            duration: Some(12.0),
            fps: Some(30.0),
            has_speech: true,
        });
        let info = MediaInfo {
            width: 1080,
            height: 1920,
            duration: Some(12.04),
            fps: Some(30.0),
            has_audio: true,
        };
        match converted_metadata(&source, &info, AspectRatio::Portrait) {
            MediaMetadata::Video(m) => {
                assert_eq!(m.width, Some(1080));
                assert_eq!(m.aspect_ratio, Some(AspectRatio::Portrait));
                assert_eq!(m.duration, Some(12.04));
                assert!(m.has_speech);
            }
            other => panic!("unexpected {:?}", other),
        }

        let logo = MediaMetadata::Image(ImageMetadata {
            is_logo: true,
            ..Default::default()
        });
        let info = MediaInfo {
            width: 1080,
            height: 1080,
            ..Default::default()
        };
        assert!(converted_metadata(&logo, &info, AspectRatio::Square).is_logo());
    }
}
