//! Upload description: transcript, description and metadata for raw media.

use std::path::Path;

use async_trait::async_trait;
use reel_ai::long_enough_for_speech;
use reel_media::MediaInfo;
use reel_models::{AspectRatio, ImageMetadata, MediaKind, MediaMetadata, Upload, VideoMetadata};
use reel_store::Patch;
use tracing::debug;

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::stage::{Outcome, Stage};
use crate::transitions::{StageSpec, DESCRIBE};

/// Seconds between frames sampled for video description.
pub const FRAME_INTERVAL_SECS: f64 = 4.0;

pub struct DescribeStage {
    ctx: WorkerContext,
}

/// What description learned about one upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    pub description: String,
    pub transcript: String,
    pub metadata: MediaMetadata,
}

impl DescribeStage {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }

    pub async fn describe(&self, upload: &Upload) -> WorkerResult<Description> {
        let path = Path::new(&upload.file_path);
        let info = self.ctx.media.probe(path).await?;
        let aspect_ratio = AspectRatio::closest(info.width, info.height);

        match upload.kind() {
            MediaKind::Video => self.describe_video(upload, path, &info, aspect_ratio).await,
            MediaKind::Image => self.describe_image(upload, path, &info, aspect_ratio).await,
        }
    }

    async fn describe_video(
        &self,
        upload: &Upload,
        path: &Path,
        info: &MediaInfo,
        aspect_ratio: Option<AspectRatio>,
    ) -> WorkerResult<Description> {
        let ai = &self.ctx.ai;
        let frames_dir = tempfile::tempdir()?;

        let (raw_transcript, frame_descriptions) = tokio::try_join!(
            ai.transcribe(path, &upload.mime_type),
            async {
                let frames = self
                    .ctx
                    .media
                    .extract_frames(path, frames_dir.path(), FRAME_INTERVAL_SECS)
                    .await?;
                debug!(upload_id = %upload.id, frames = frames.len(), "Describing sampled frames");
                ai.describe_frames(&frames).await
            }
        )?;

        let duration = info.duration.unwrap_or_default();
        let has_speech =
            long_enough_for_speech(&raw_transcript) && ai.transcript_has_speech(&raw_transcript).await?;

        let description = ai
            .summarize_description(&frame_descriptions, &raw_transcript, duration)
            .await?;
        let transcript = if has_speech {
            ai.tidy_transcript(&description, &raw_transcript, duration).await?
        } else {
            String::new()
        };

        Ok(Description {
            description,
            transcript,
            metadata: MediaMetadata::Video(VideoMetadata {
                width: Some(info.width),
                height: Some(info.height),
                aspect_ratio,
                duration: info.duration,
                fps: info.fps,
                has_speech,
            }),
        })
    }

    async fn describe_image(
        &self,
        upload: &Upload,
        path: &Path,
        info: &MediaInfo,
        aspect_ratio: Option<AspectRatio>,
    ) -> WorkerResult<Description> {
        let ai = &self.ctx.ai;
        let context = format!("filename is {}", upload.filename);

        let (description, is_logo, is_profile_pic) = tokio::try_join!(
            ai.describe_image(path, &context),
            ai.is_logo(path),
            ai.is_profile_pic(path),
        )?;

        Ok(Description {
            description,
            transcript: String::new(),
            metadata: MediaMetadata::Image(ImageMetadata {
                width: Some(info.width),
                height: Some(info.height),
                aspect_ratio,
                is_logo,
                is_profile_pic,
            }),
        })
    }
}

#[async_trait]
impl Stage for DescribeStage {
    fn spec(&self) -> &'static StageSpec {
        &DESCRIBE
    }

    async fn process(&self, id: &str) -> WorkerResult<Outcome> {
        let upload: Upload = self.ctx.repo.require(id).await?;
        if upload.file_path.is_empty() {
            return Err(WorkerError::invalid_input(format!("upload {} has no file path", id)));
        }

        let described = self.describe(&upload).await?;
        Ok(Outcome::Complete(
            Patch::new()
                .set("description", described.description)
                .set("transcript", described.transcript)
                .set("processed", true)
                .set_json("metadata", &described.metadata),
        ))
    }
}
