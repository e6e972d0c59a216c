//! Script generation: title and narration script for one video job.

use async_trait::async_trait;
use reel_models::VideoJob;
use reel_store::{Filter, Patch};

use crate::context::WorkerContext;
use crate::error::WorkerResult;
use crate::stage::{Outcome, Stage};
use crate::stages::{converted_asset_keys, converted_assets, id_gate};
use crate::transitions::{StageSpec, SCRIPT};

pub struct ScriptStage {
    ctx: WorkerContext,
}

impl ScriptStage {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Stage for ScriptStage {
    fn spec(&self) -> &'static StageSpec {
        &SCRIPT
    }

    /// Only jobs whose request already has converted assets at their ratio,
    /// so unready jobs never hold a claim slot.
    async fn eligibility(&self) -> WorkerResult<Option<Filter>> {
        let repo = &self.ctx.repo;
        let converted = converted_asset_keys(repo).await?;
        if converted.is_empty() {
            return Ok(None);
        }

        let waiting: Vec<VideoJob> = repo
            .find(&SCRIPT.eligible_filter(self.ctx.config.max_attempts), None)
            .await?;
        let ready = waiting
            .into_iter()
            .filter(|v| converted.contains(&(v.request_id.to_string(), v.aspect_ratio)))
            .map(|v| v.id.to_string())
            .collect();
        Ok(id_gate(ready))
    }

    async fn process(&self, id: &str) -> WorkerResult<Outcome> {
        let video: VideoJob = self.ctx.repo.require(id).await?;
        let assets = converted_assets(&self.ctx.repo, &video.request_id, video.aspect_ratio).await?;
        if assets.is_empty() {
            return Ok(Outcome::Skipped(format!(
                "no converted {} assets for request {}",
                video.aspect_ratio, video.request_id
            )));
        }

        let generated = self.ctx.ai.generate_title_and_script(&video, &assets).await?;
        Ok(Outcome::Complete(
            Patch::new()
                .set("title", generated.title)
                .set("script", generated.script)
                .set("script_generated", true),
        ))
    }
}
