//! Video assembly: expand, render every scene, and cut the final video.
//!
//! Readiness is a scan. Every video at `scene_extraction_complete` is loaded
//! with its scenes and kept only when all of them are narrated; the ids that
//! pass become the claim gate for this poll.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reel_media::{BodyClip, Canvas, SceneAudio, TitleCard, Visual};
use reel_models::{
    Asset, MediaKind, Scene, SceneList, SceneStatus, SceneType, VideoJob, VideoRequest,
};
use reel_store::{Filter, Patch, Repository};
use tracing::{debug, warn};

use crate::context::{path_string, WorkerContext};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RecordLogger;
use crate::metrics;
use crate::stage::{Outcome, Stage};
use crate::stages::{converted_assets, id_gate};
use crate::stages::expand::{expand_scenes, persist_expansion};
use crate::transitions::{StageSpec, ASSEMBLE};

fn all_narrated(scenes: &[Scene]) -> bool {
    !scenes.is_empty() && scenes.iter().all(|s| s.status == SceneStatus::NarrationComplete)
}

async fn scenes_of(repo: &Repository, video_id: &str) -> WorkerResult<Vec<Scene>> {
    Ok(repo.find(&Filter::eq("video_id", video_id), None).await?)
}

/// Ids of videos whose every scene is `narration_complete`.
pub async fn ready_video_ids(repo: &Repository, max_attempts: u32) -> WorkerResult<Vec<String>> {
    let videos: Vec<VideoJob> = repo.find(&ASSEMBLE.eligible_filter(max_attempts), None).await?;

    let mut ready = Vec::new();
    for video in videos {
        if all_narrated(&scenes_of(repo, video.id.as_str()).await?) {
            ready.push(video.id.to_string());
        }
    }
    Ok(ready)
}

pub struct AssembleStage {
    ctx: WorkerContext,
}

impl AssembleStage {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }

    async fn render_scene(
        &self,
        video: &VideoJob,
        request: &VideoRequest,
        scene: &Scene,
        assets: &HashMap<String, Asset>,
    ) -> WorkerResult<PathBuf> {
        let config = &self.ctx.config;
        if let Some(existing) = &scene.generated_scene_video {
            if !config.force_render {
                debug!(scene_id = %scene.id, "Scene already rendered");
                return Ok(PathBuf::from(existing));
            }
        }

        let output = self
            .ctx
            .paths
            .scene_video(&video.request_id, video.aspect_ratio, &scene.id);
        let canvas = Canvas::for_ratio(video.aspect_ratio);
        let duration = scene
            .duration
            .ok_or_else(|| WorkerError::invalid_input(format!("scene {} has no duration", scene.id)))?;
        let subtitles = config.subtitles.then(|| scene.narration.clone());

        match scene.scene_type {
            kind if kind.is_card() => {
                let card = TitleCard {
                    canvas,
                    layout: video.aspect_ratio.settings(),
                    narration: scene.narration.clone(),
                    brand_link: request.brand_link.clone(),
                    logo: config.brand_logo.clone(),
                    narration_audio: narration_audio(scene)?,
                    duration,
                    font_file: config.font_file.clone(),
                };
                self.ctx.media.render_title_card(&card, &output).await?;
            }
            SceneType::HasSpeech => {
                let asset = scene
                    .asset_filenames
                    .first()
                    .and_then(|name| assets.get(name))
                    .ok_or_else(|| {
                        WorkerError::invalid_input(format!("speech scene {} lost its video asset", scene.id))
                    })?;
                let clip = BodyClip {
                    canvas,
                    visuals: vec![visual_for(asset)],
                    duration,
                    audio: SceneAudio::Embedded,
                    subtitles,
                    font_file: config.font_file.clone(),
                };
                self.ctx.media.render_body(&clip, &output).await?;
            }
            _ => {
                let visuals = scene
                    .asset_filenames
                    .iter()
                    .filter_map(|name| match assets.get(name) {
                        Some(asset) => Some(visual_for(asset)),
                        None => {
                            warn!(scene_id = %scene.id, filename = %name, "Scene references an unknown asset");
                            None
                        }
                    })
                    .collect();
                let clip = BodyClip {
                    canvas,
                    visuals,
                    duration,
                    audio: SceneAudio::Narration(narration_audio(scene)?),
                    subtitles,
                    font_file: config.font_file.clone(),
                };
                self.ctx.media.render_body(&clip, &output).await?;
            }
        }

        let _: Scene = self
            .ctx
            .repo
            .update(
                scene.id.as_str(),
                &Patch::new().set("generated_scene_video", path_string(&output)),
            )
            .await?;
        Ok(output)
    }
}

fn narration_audio(scene: &Scene) -> WorkerResult<PathBuf> {
    scene
        .narration_audio_filename
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| WorkerError::invalid_input(format!("scene {} has no narration audio", scene.id)))
}

fn visual_for(asset: &Asset) -> Visual {
    match asset.metadata.kind() {
        MediaKind::Image => Visual::image(&asset.file_path),
        MediaKind::Video => Visual::video(&asset.file_path, asset.metadata.duration()),
    }
}

#[async_trait]
impl Stage for AssembleStage {
    fn spec(&self) -> &'static StageSpec {
        &ASSEMBLE
    }

    async fn eligibility(&self) -> WorkerResult<Option<Filter>> {
        let ready = ready_video_ids(&self.ctx.repo, self.ctx.config.max_attempts).await?;
        Ok(id_gate(ready))
    }

    async fn process(&self, id: &str) -> WorkerResult<Outcome> {
        let repo = &self.ctx.repo;
        let logger = RecordLogger::new(id, ASSEMBLE.name);

        let video: VideoJob = repo.require(id).await?;
        let scenes = scenes_of(repo, id).await?;
        if !all_narrated(&scenes) {
            return Ok(Outcome::Skipped(format!("video {} has scenes still narrating", id)));
        }
        let request: VideoRequest = repo.require(video.request_id.as_str()).await?;

        let assets: HashMap<String, Asset> = converted_assets(repo, &video.request_id, video.aspect_ratio)
            .await?
            .into_iter()
            .map(|a| (a.filename.clone(), a))
            .collect();

        let mut list = SceneList::from_scenes(scenes)?;
        let asset_list: Vec<Asset> = assets.values().cloned().collect();
        let expansion = expand_scenes(&mut list, &asset_list)?;
        if !expansion.is_empty() {
            list.validate()?;
            persist_expansion(repo, &list, &expansion).await?;
            metrics::record_scene_split(expansion.inserted.len());
            logger.log_progress(&format!("split out {} speech scenes", expansion.inserted.len()));
        }

        let ordered: Vec<Scene> = list.into_ordered();
        let parallel = self.ctx.config.max_scene_parallel.max(1);
        let pending: Vec<_> = ordered
            .iter()
            .map(|scene| self.render_scene(&video, &request, scene, &assets))
            .collect();
        let clips: Vec<PathBuf> = stream::iter(pending)
            .buffered(parallel)
            .try_collect()
            .await?;
        logger.log_progress(&format!("{} scene clips ready", clips.len()));

        let final_cut = self
            .ctx
            .paths
            .final_cut(&video.request_id, video.aspect_ratio, &video.id);
        self.ctx
            .media
            .concatenate(&clips, &final_cut, self.ctx.config.fade_secs)
            .await?;

        Ok(Outcome::Complete(
            Patch::new().set("final_cut_path", path_string(&final_cut)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{AspectRatio, FormatSpec};

    #[test]
    fn test_all_narrated_requires_scenes() {
        let request = VideoRequest::new("en", "t", "s");
        let video = VideoJob::spawn(&request, FormatSpec::new(AspectRatio::Square, 15), "0");

        assert!(!all_narrated(&[]));

        let mut done = Scene::new(&video, SceneType::Title, "Hi", vec![]);
        done.status = SceneStatus::NarrationComplete;
        let pending = Scene::new(&video, SceneType::Outro, "Bye", vec![]);

        assert!(all_narrated(&[done.clone()]));
        assert!(!all_narrated(&[done, pending]));
    }
}
