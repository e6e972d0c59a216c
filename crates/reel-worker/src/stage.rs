//! Generic stage loop.
//!
//! Each poll atomically claims up to `batch_size` eligible records, processes
//! them concurrently while a heartbeat keeps their leases alive, and settles
//! each record through the stage's [`StageSpec`]. An empty poll sleeps the
//! idle backoff. Errors in one iteration are logged and never stop the loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reel_models::now_millis;
use reel_store::{lookup, Filter, Patch, Repository};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RecordLogger;
use crate::metrics;
use crate::transitions::{Failure, StageSpec, LEASE_FIELD};

/// Claims still being processed, keyed by id with their claim stamp.
type InFlight = Mutex<HashMap<String, DateTime<Utc>>>;

/// Result of processing one claimed record.
#[derive(Debug)]
pub enum Outcome {
    /// Work done; the patch carries the results to persist with the
    /// completion transition.
    Complete(Patch),
    /// An upstream record is not ready. The record goes back to eligible
    /// without spending an attempt. This is the only release path; stages
    /// that can be unready should also gate their claims so released
    /// records do not crowd out ready ones.
    Skipped(String),
}

impl Outcome {
    pub fn complete() -> Self {
        Outcome::Complete(Patch::new())
    }
}

/// One pipeline stage.
#[async_trait]
pub trait Stage: Send + Sync {
    fn spec(&self) -> &'static StageSpec;

    /// Extra claim condition ANDed with the stage's eligibility filter.
    /// `None` means nothing can be claimed this poll.
    async fn eligibility(&self) -> WorkerResult<Option<Filter>> {
        Ok(Some(Filter::all()))
    }

    async fn process(&self, id: &str) -> WorkerResult<Outcome>;
}

#[derive(Debug, Clone)]
struct Claim {
    id: String,
    started: DateTime<Utc>,
    /// Attempts recorded before this one
    attempts: u32,
}

/// Drives one [`Stage`] against the store.
pub struct StageRunner {
    stage: Arc<dyn Stage>,
    repo: Repository,
    config: WorkerConfig,
}

impl StageRunner {
    pub fn new(stage: Arc<dyn Stage>, repo: Repository, config: WorkerConfig) -> Self {
        Self {
            stage,
            repo,
            config,
        }
    }

    pub fn name(&self) -> &'static str {
        self.stage.spec().name
    }

    /// Poll until shutdown or until `max_count` records have been processed.
    /// Returns the number of records processed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerResult<usize> {
        let spec = self.stage.spec();
        info!(
            stage = spec.name,
            batch_size = self.config.batch_size,
            max_count = ?self.config.max_count,
            "Starting stage loop"
        );

        let mut processed = 0usize;
        loop {
            if *shutdown.borrow() {
                info!(stage = spec.name, "Shutdown signal received, stopping stage");
                break;
            }

            let limit = match self.config.max_count {
                Some(max) if processed >= max => {
                    info!(stage = spec.name, processed, "Max count reached, stopping stage");
                    break;
                }
                Some(max) => (max - processed).min(self.config.batch_size),
                None => self.config.batch_size,
            };

            match self.run_batch(limit).await {
                Ok(0) => {
                    metrics::record_idle_poll(spec.name);
                    debug!(stage = spec.name, "Nothing to claim, backing off");
                    if self.idle(&mut shutdown).await {
                        break;
                    }
                }
                Ok(n) => processed += n,
                Err(e) => {
                    error!(stage = spec.name, "Stage iteration failed: {}", e);
                    if self.idle(&mut shutdown).await {
                        break;
                    }
                }
            }
        }

        Ok(processed)
    }

    /// Claim and process one batch of up to `batch_size` records. Returns how
    /// many were settled; released records do not count, so a poll that only
    /// finds unready work backs off like an empty one.
    pub async fn run_once(&self) -> WorkerResult<usize> {
        self.run_batch(self.config.batch_size).await
    }

    async fn run_batch(&self, limit: usize) -> WorkerResult<usize> {
        let claims = self.claim_batch(limit).await?;
        if claims.is_empty() {
            return Ok(0);
        }

        let spec = self.stage.spec();
        metrics::record_claimed(spec.name, claims.len());
        debug!(stage = spec.name, count = claims.len(), "Claimed batch");

        let in_flight: Arc<InFlight> =
            Arc::new(Mutex::new(claims.iter().map(|c| (c.id.clone(), c.started)).collect()));
        let heartbeat = self.spawn_heartbeat(Arc::clone(&in_flight));

        let settled = join_all(claims.iter().map(|claim| self.process_claim(claim, &in_flight))).await;
        heartbeat.abort();

        Ok(settled.into_iter().filter(|progressed| *progressed).count())
    }

    async fn claim_batch(&self, limit: usize) -> WorkerResult<Vec<Claim>> {
        let spec = self.stage.spec();
        let gate = match self.stage.eligibility().await? {
            Some(gate) => gate,
            None => return Ok(Vec::new()),
        };
        let filter = spec.eligible_filter(self.config.max_attempts).and(gate);
        let attempts_field = spec.attempts_field();

        let mut claims = Vec::with_capacity(limit);
        while claims.len() < limit {
            let now = Utc::now();
            let lease = now.timestamp_millis() + self.config.claim_ttl_ms();
            let claimed = self
                .repo
                .store()
                .claim_next(spec.collection, &filter, &spec.claim_patch(now, lease))
                .await?;
            let Some(doc) = claimed else { break };

            let id = lookup(&doc, "id")
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| WorkerError::processing_failed(format!("claimed {} record has no id", spec.collection)))?;
            let attempts = lookup(&doc, &attempts_field).as_u64().unwrap_or(0) as u32;

            claims.push(Claim {
                id,
                started: now,
                attempts,
            });
        }
        Ok(claims)
    }

    /// Returns false when the record was released, or when the claim was
    /// lost before it could be settled.
    async fn process_claim(&self, claim: &Claim, in_flight: &InFlight) -> bool {
        let spec = self.stage.spec();
        let logger = RecordLogger::new(&claim.id, spec.name);
        let span = logger.create_span();

        async {
            logger.log_start(&format!("attempt {}", claim.attempts + 1));
            let timer = Instant::now();
            let result = self.stage.process(&claim.id).await;

            if let Ok(mut ids) = in_flight.lock() {
                ids.remove(&claim.id);
            }

            let now = Utc::now();
            let (patch, outcome) = match result {
                Ok(Outcome::Complete(results)) => {
                    logger.log_completion(spec.complete);
                    (spec.complete_patch(results, claim.started, now), "complete")
                }
                Ok(Outcome::Skipped(reason)) => {
                    logger.log_progress(&format!("not ready, releasing: {}", reason));
                    (spec.release_patch(), "skipped")
                }
                Err(e) if e.is_not_found() => {
                    logger.log_error(&format!("record missing, not retrying: {}", e));
                    (spec.failure_patch(Failure::Exhausted, now), "failed")
                }
                Err(e) => {
                    let failure = spec.failure_kind(claim.attempts, self.config.max_attempts);
                    match failure {
                        Failure::Requeued => logger.log_warning(&format!(
                            "attempt {} failed, requeueing to {}: {}",
                            claim.attempts + 1,
                            spec.retry_target,
                            e
                        )),
                        Failure::Exhausted => logger.log_error(&format!(
                            "attempt {} failed, giving up: {}",
                            claim.attempts + 1,
                            e
                        )),
                    }
                    let outcome = match failure {
                        Failure::Requeued => "requeued",
                        Failure::Exhausted => "failed",
                    };
                    (spec.failure_patch(failure, now), outcome)
                }
            };

            let guard = spec.claim_guard(&claim.id, claim.started);
            let settled = match self.repo.store().claim_next(spec.collection, &guard, &patch).await {
                Ok(Some(_)) => true,
                Ok(None) => {
                    logger.log_warning(&format!("claim lost before settling as {}, leaving record as is", outcome));
                    false
                }
                Err(e) => {
                    logger.log_error(&format!("failed to settle record as {}: {}", outcome, e));
                    false
                }
            };
            let outcome = if settled { outcome } else { "lost" };
            metrics::record_settled(spec.name, outcome, timer.elapsed().as_secs_f64());
            settled && outcome != "skipped"
        }
        .instrument(span)
        .await
    }

    /// Extend the leases of records still being processed.
    fn spawn_heartbeat(&self, in_flight: Arc<InFlight>) -> JoinHandle<()> {
        let repo = self.repo.clone();
        let spec = self.stage.spec();
        let interval = self.config.heartbeat_interval;
        let ttl_ms = self.config.claim_ttl_ms();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; the claim already set the lease.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let claims: Vec<(String, DateTime<Utc>)> = match in_flight.lock() {
                    Ok(claims) => claims.iter().map(|(id, started)| (id.clone(), *started)).collect(),
                    Err(_) => return,
                };
                let patch = Patch::new().set(LEASE_FIELD, now_millis() + ttl_ms);
                for (id, started) in claims {
                    let guard = spec.claim_guard(&id, started);
                    match repo.store().claim_next(spec.collection, &guard, &patch).await {
                        Ok(Some(_)) => {}
                        Ok(None) => debug!(stage = spec.name, record_id = %id, "Claim no longer held, not extending lease"),
                        Err(e) => warn!(stage = spec.name, record_id = %id, "Failed to extend lease: {}", e),
                    }
                }
            }
        })
    }

    /// Sleep the idle backoff. Returns true when shutdown was requested.
    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.config.idle_backoff) => false,
            changed = shutdown.changed() => match changed {
                Ok(()) => *shutdown.borrow(),
                // Sender gone: nobody can ask us to stop, keep polling.
                Err(_) => {
                    tokio::time::sleep(self.config.idle_backoff).await;
                    false
                }
            },
        }
    }
}
