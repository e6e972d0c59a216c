//! Scene extraction: turn a video's script into its linked scene list.
//!
//! Extraction is a full replace. Existing scenes for the video are deleted
//! and the new list is written already linked, so readers never see a
//! partially wired chain from this run.

use async_trait::async_trait;
use reel_ai::ExtractedScenes;
use reel_models::{Scene, SceneList, SceneType, VideoJob, OUTRO_NARRATION};
use reel_store::Filter;

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RecordLogger;
use crate::stage::{Outcome, Stage};
use crate::stages::converted_assets;
use crate::transitions::{StageSpec, EXTRACT};

pub struct ExtractStage {
    ctx: WorkerContext,
}

impl ExtractStage {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }
}

/// Title card, one body scene per extracted scene, then the outro.
pub fn layout_scenes(video: &VideoJob, title: &str, extracted: ExtractedScenes) -> SceneList {
    let mut scenes = Vec::with_capacity(extracted.scenes.len() + 2);
    scenes.push(Scene::new(video, SceneType::Title, title, Vec::new()));
    scenes.extend(
        extracted
            .scenes
            .into_iter()
            .map(|s| Scene::new(video, SceneType::Body, s.narration, s.asset_filenames)),
    );
    scenes.push(Scene::new(video, SceneType::Outro, OUTRO_NARRATION, Vec::new()));
    SceneList::link(scenes)
}

#[async_trait]
impl Stage for ExtractStage {
    fn spec(&self) -> &'static StageSpec {
        &EXTRACT
    }

    async fn process(&self, id: &str) -> WorkerResult<Outcome> {
        let repo = &self.ctx.repo;
        let logger = RecordLogger::new(id, EXTRACT.name);

        if let Some(patch) = EXTRACT.working_patch() {
            let _: VideoJob = repo.update(id, &patch).await?;
        }
        let video: VideoJob = repo.require(id).await?;

        let (title, script) = match (&video.title, &video.script) {
            (Some(title), Some(script)) if !script.trim().is_empty() => (title.as_str(), script.as_str()),
            _ => return Err(WorkerError::invalid_input(format!("video {} has no script", id))),
        };

        let assets = converted_assets(repo, &video.request_id, video.aspect_ratio).await?;
        let extracted = self.ctx.ai.extract_scenes(title, script, &assets).await?;
        let list = layout_scenes(&video, title, extracted);
        list.validate()?;

        let removed = repo
            .delete_where::<Scene>(&Filter::eq("video_id", video.id.as_str()))
            .await?;
        if removed > 0 {
            logger.log_progress(&format!("replacing {} scenes from an earlier run", removed));
        }

        let count = list.len();
        for scene in list.into_ordered() {
            repo.insert(&scene).await?;
        }

        logger.log_progress(&format!("{} scenes linked", count));
        Ok(Outcome::complete())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_ai::ExtractedScene;
    use reel_models::{AspectRatio, FormatSpec, VideoRequest};

    #[test]
    fn test_layout_wraps_body_with_title_and_outro() {
        let request = VideoRequest::new("en", "topic", "promo");
        let video = VideoJob::spawn(&request, FormatSpec::new(AspectRatio::Portrait, 30), "0");
        let extracted = ExtractedScenes {
            title: "ignored".into(),
            scenes: vec![
                ExtractedScene {
                    narration: "First".into(),
                    asset_filenames: vec!["a-image-9x16.png".into()],
                },
                ExtractedScene {
                    narration: "Second".into(),
                    asset_filenames: vec![],
                },
            ],
        };

        let list = layout_scenes(&video, "Harbour Days", extracted);
        list.validate().unwrap();

        let ordered = list.ordered();
        let types: Vec<SceneType> = ordered.iter().map(|s| s.scene_type).collect();
        assert_eq!(
            types,
            vec![SceneType::Title, SceneType::Body, SceneType::Body, SceneType::Outro]
        );
        assert_eq!(ordered[0].narration, "Harbour Days");
        assert_eq!(ordered[1].asset_filenames, vec!["a-image-9x16.png"]);
        assert_eq!(ordered[3].narration, OUTRO_NARRATION);
    }

    #[test]
    fn test_layout_with_no_body_scenes() {
        let request = VideoRequest::new("en", "topic", "promo");
        let video = VideoJob::spawn(&request, FormatSpec::new(AspectRatio::Square, 15), "0");
        let list = layout_scenes(
            &video,
            "Just a title",
            ExtractedScenes {
                title: String::new(),
                scenes: vec![],
            },
        );
        assert_eq!(list.len(), 2);
        assert_eq!(list.head().unwrap().scene_type, SceneType::Title);
        assert_eq!(list.tail().unwrap().scene_type, SceneType::Outro);
    }
}
