//! Video spawning: fan a request out into one video job per format.
//!
//! Job ids are derived from the request and a spawn key, so a retried spawn
//! rewrites the same ids and an existing job counts as already spawned.

use std::collections::BTreeSet;

use async_trait::async_trait;
use reel_models::{
    AspectRatioConversionJob, ConversionStatus, FormatSpec, VideoJob, VideoRequest,
    VideoRequestFormat,
};
use reel_store::{Filter, Repository};
use tracing::debug;

use crate::context::WorkerContext;
use crate::error::WorkerResult;
use crate::stage::{Outcome, Stage};
use crate::stages::{converted_job_keys, described_requests_gate, id_gate};
use crate::transitions::{StageSpec, SPAWN_FORMAT, SPAWN_REQUEST};

/// Insert a job unless a previous attempt already did. Returns true when new.
async fn insert_job(repo: &Repository, job: &VideoJob) -> WorkerResult<bool> {
    match repo.insert(job).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_already_exists() => {
            debug!(video_id = %job.id, "Video job already spawned");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Request-level variant: one job per requested format, keyed by format index.
pub struct SpawnRequestStage {
    ctx: WorkerContext,
}

impl SpawnRequestStage {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Stage for SpawnRequestStage {
    fn spec(&self) -> &'static StageSpec {
        &SPAWN_REQUEST
    }

    async fn eligibility(&self) -> WorkerResult<Option<Filter>> {
        Ok(Some(described_requests_gate(&self.ctx.repo, "id").await?))
    }

    async fn process(&self, id: &str) -> WorkerResult<Outcome> {
        let request: VideoRequest = self.ctx.repo.require(id).await?;

        let mut spawned = 0;
        for (index, format) in request.formats.iter().enumerate() {
            let job = VideoJob::spawn(&request, *format, &index.to_string());
            if insert_job(&self.ctx.repo, &job).await? {
                spawned += 1;
            }
        }

        debug!(request_id = %request.id, spawned, formats = request.formats.len(), "Spawned video jobs");
        Ok(Outcome::complete())
    }
}

/// Format-level variant: one job per VideoRequestFormat, keyed by format id.
pub struct SpawnFormatStage {
    ctx: WorkerContext,
}

impl SpawnFormatStage {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Stage for SpawnFormatStage {
    fn spec(&self) -> &'static StageSpec {
        &SPAWN_FORMAT
    }

    /// Only aspect ratios that have at least one converted conversion job,
    /// narrowed to formats whose own request converted at that ratio.
    async fn eligibility(&self) -> WorkerResult<Option<Filter>> {
        let repo = &self.ctx.repo;
        let converted = converted_job_keys(repo).await?;
        if converted.is_empty() {
            return Ok(None);
        }
        let ratios: BTreeSet<&str> = converted.iter().map(|(_, ratio)| ratio.as_str()).collect();

        let waiting: Vec<VideoRequestFormat> = repo
            .find(&SPAWN_FORMAT.eligible_filter(self.ctx.config.max_attempts), None)
            .await?;
        let ready = waiting
            .into_iter()
            .filter(|f| converted.contains(&(f.request_id.to_string(), f.aspect_ratio)))
            .map(|f| f.id.to_string())
            .collect();

        Ok(id_gate(ready).map(|ids| Filter::is_in("aspect_ratio", ratios).and(ids)))
    }

    async fn process(&self, id: &str) -> WorkerResult<Outcome> {
        let repo = &self.ctx.repo;
        let format: VideoRequestFormat = repo.require(id).await?;

        // Re-checked after the claim; the gate was computed before it.
        let converted: Vec<AspectRatioConversionJob> = repo
            .find(
                &Filter::eq("request_id", format.request_id.as_str())
                    .and(Filter::eq("aspect_ratio", format.aspect_ratio.as_str()))
                    .and(Filter::eq("status", ConversionStatus::Converted.as_str())),
                Some(1),
            )
            .await?;
        if converted.is_empty() {
            return Ok(Outcome::Skipped(format!(
                "request {} has no converted {} assets yet",
                format.request_id, format.aspect_ratio
            )));
        }

        let request: VideoRequest = repo.require(format.request_id.as_str()).await?;
        let job = VideoJob::spawn(
            &request,
            FormatSpec::new(format.aspect_ratio, format.length),
            format.id.as_str(),
        )
        .with_format_id(format.id.clone());
        insert_job(repo, &job).await?;

        Ok(Outcome::complete())
    }
}
