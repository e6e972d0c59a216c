//! Scene narration: synthesize each scene's voice-over and record its length.

use async_trait::async_trait;
use reel_models::Scene;
use reel_store::Patch;

use crate::context::{path_string, WorkerContext};
use crate::error::WorkerResult;
use crate::stage::{Outcome, Stage};
use crate::transitions::{StageSpec, NARRATE};

pub struct NarrateStage {
    ctx: WorkerContext,
}

impl NarrateStage {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Stage for NarrateStage {
    fn spec(&self) -> &'static StageSpec {
        &NARRATE
    }

    async fn process(&self, id: &str) -> WorkerResult<Outcome> {
        let scene: Scene = self.ctx.repo.require(id).await?;
        let output = self
            .ctx
            .paths
            .narration(&scene.request_id, scene.aspect_ratio, &scene.id);

        self.ctx.ai.synthesize_speech(&scene.narration, &output).await?;
        let duration = self.ctx.media.duration(&output).await?;

        Ok(Outcome::Complete(
            Patch::new()
                .set("narration_audio_filename", path_string(&output))
                .set("duration", duration),
        ))
    }
}
