//! Recovery of claims abandoned by crashed workers.
//!
//! A claim carries `lease_expires_at_ms`, extended by the owning worker's
//! heartbeat. Once it lapses the sweeper settles the record as a failed
//! attempt through the same atomic claim primitive, so a record is reclaimed
//! by exactly one sweeper and the attempt ceiling still applies.

use std::time::Duration;

use chrono::Utc;
use reel_models::now_millis;
use reel_store::{Filter, Repository};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::WorkerResult;
use crate::metrics;
use crate::transitions::{Failure, StageSpec};

pub struct LeaseSweeper {
    repo: Repository,
    specs: Vec<&'static StageSpec>,
    max_attempts: u32,
    interval: Duration,
}

impl LeaseSweeper {
    pub fn new(repo: Repository, specs: Vec<&'static StageSpec>, max_attempts: u32, interval: Duration) -> Self {
        Self {
            repo,
            specs,
            max_attempts,
            interval,
        }
    }

    /// Sweep every `interval` until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.interval, stages = self.specs.len(), "Starting lease sweeper");
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(0) => {}
                        Ok(n) => info!(reclaimed = n, "Reclaimed expired leases"),
                        Err(e) => error!("Lease sweep failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// One pass over every stage. Returns the number of records reclaimed.
    pub async fn sweep(&self) -> WorkerResult<usize> {
        let mut total = 0;
        for spec in self.specs.iter().copied() {
            total += sweep_stage(&self.repo, spec, self.max_attempts).await?;
        }
        Ok(total)
    }
}

/// Settle every expired claim of one stage as a failed attempt.
pub async fn sweep_stage(repo: &Repository, spec: &'static StageSpec, max_attempts: u32) -> WorkerResult<usize> {
    let expired = spec.expired_filter(now_millis());
    let last_attempt = max_attempts.saturating_sub(1);

    let passes = [
        (
            Failure::Exhausted,
            Filter::gte(spec.attempts_field(), last_attempt),
        ),
        (
            Failure::Requeued,
            Filter::lt(spec.attempts_field(), last_attempt),
        ),
    ];

    let mut reclaimed = 0;
    for (failure, attempts) in passes {
        let filter = expired.clone().and(attempts);
        let patch = spec.failure_patch(failure, Utc::now());
        while let Some(doc) = repo.store().claim_next(spec.collection, &filter, &patch).await? {
            let id = doc.get("id").and_then(|v| v.as_str()).unwrap_or_default();
            warn!(
                stage = spec.name,
                record_id = %id,
                outcome = ?failure,
                "Lease expired, settling abandoned claim"
            );
            metrics::record_lease_reclaimed(spec.name, failure == Failure::Exhausted);
            reclaimed += 1;
        }
    }
    Ok(reclaimed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transitions::{LEASE_FIELD, NARRATE};
    use reel_models::{
        AspectRatio, FormatSpec, Scene, SceneStatus, SceneType, VideoJob, VideoRequest,
    };
    use reel_store::{MemoryStore, Patch};
    use std::sync::Arc;

    async fn scene_in_flight(repo: &Repository, attempts: i64, lease: i64) -> String {
        let request = VideoRequest::new("en", "topic", "promo");
        let video = VideoJob::spawn(&request, FormatSpec::new(AspectRatio::Portrait, 30), "0");
        let scene = Scene::new(&video, SceneType::Body, "hello", vec![]);
        repo.insert(&scene).await.unwrap();
        let _: Scene = repo
            .update(
                scene.id.as_str(),
                &Patch::new()
                    .set("status", "narration_started")
                    .set("scene_narration_attempts", attempts)
                    .set(LEASE_FIELD, lease),
            )
            .await
            .unwrap();
        scene.id.to_string()
    }

    #[tokio::test]
    async fn test_expired_lease_requeues() {
        let repo = Repository::new(Arc::new(MemoryStore::new()));
        let id = scene_in_flight(&repo, 0, 1).await;

        assert_eq!(sweep_stage(&repo, &NARRATE, 3).await.unwrap(), 1);
        let scene: Scene = repo.require(&id).await.unwrap();
        assert_eq!(scene.status, SceneStatus::Generated);
        assert_eq!(scene.scene_narration_attempts, 1);
        assert_eq!(scene.lease_expires_at_ms, None);
    }

    #[tokio::test]
    async fn test_expired_last_attempt_fails() {
        let repo = Repository::new(Arc::new(MemoryStore::new()));
        let id = scene_in_flight(&repo, 2, 1).await;

        assert_eq!(sweep_stage(&repo, &NARRATE, 3).await.unwrap(), 1);
        let scene: Scene = repo.require(&id).await.unwrap();
        assert_eq!(scene.status, SceneStatus::SceneNarrationFailed);
        assert_eq!(scene.scene_narration_attempts, 3);
    }

    #[tokio::test]
    async fn test_live_lease_is_left_alone() {
        let repo = Repository::new(Arc::new(MemoryStore::new()));
        let id = scene_in_flight(&repo, 0, now_millis() + 60_000).await;

        assert_eq!(sweep_stage(&repo, &NARRATE, 3).await.unwrap(), 0);
        let scene: Scene = repo.require(&id).await.unwrap();
        assert_eq!(scene.status, SceneStatus::NarrationStarted);
    }
}
