//! Stage transition table.
//!
//! Every stage moves records through the same shape:
//! `eligible -> claimed -> complete | failed | eligible (attempt + 1)`.
//! A [`StageSpec`] names the concrete status values and field prefix for one
//! stage, and builds the store filters and patches for each transition so the
//! stage loop never hand-writes status strings.

use chrono::{DateTime, Utc};
use reel_models::{
    Collection, ConversionStatus, FormatStatus, RequestStatus, SceneStatus, UploadStatus,
    VideoJobStatus,
};
use reel_store::{Filter, Patch};
use serde_json::Value;

/// Field holding a claim's lease expiry in epoch milliseconds.
pub const LEASE_FIELD: &str = "lease_expires_at_ms";

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    pub name: &'static str,
    pub collection: Collection,
    pub eligible: &'static str,
    /// Status written by the atomic claim
    pub claimed: &'static str,
    /// Status the processing function moves to once it starts, if different
    pub working: Option<&'static str>,
    pub complete: &'static str,
    pub failed: &'static str,
    /// Status a failed attempt reverts to while attempts remain
    pub retry_target: &'static str,
    /// Prefix of the `_attempts`, `_start_time`, `_end_time` and `_duration` fields
    pub timing: &'static str,
    /// Successful attempts also bump the attempt counter
    pub count_attempt_on_success: bool,
}

/// Where a failed attempt lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Requeued,
    Exhausted,
}

impl StageSpec {
    pub fn attempts_field(&self) -> String {
        format!("{}_attempts", self.timing)
    }

    fn start_field(&self) -> String {
        format!("{}_start_time", self.timing)
    }

    fn end_field(&self) -> String {
        format!("{}_end_time", self.timing)
    }

    fn duration_field(&self) -> String {
        format!("{}_duration", self.timing)
    }

    /// Statuses a live claim can be in.
    pub fn in_flight(&self) -> Vec<&'static str> {
        let mut statuses = vec![self.claimed];
        statuses.extend(self.working);
        statuses
    }

    /// `status == eligible AND attempts < max_attempts`.
    pub fn eligible_filter(&self, max_attempts: u32) -> Filter {
        Filter::eq("status", self.eligible).and(Filter::lt(self.attempts_field(), max_attempts))
    }

    pub fn claim_patch(&self, now: DateTime<Utc>, lease_expires_at_ms: i64) -> Patch {
        Patch::new()
            .set("status", self.claimed)
            .set_json(self.start_field(), &now)
            .clear(self.end_field())
            .set(LEASE_FIELD, lease_expires_at_ms)
    }

    pub fn working_patch(&self) -> Option<Patch> {
        self.working.map(|status| Patch::new().set("status", status))
    }

    /// Extend `results` with the completion transition.
    pub fn complete_patch(&self, results: Patch, started: DateTime<Utc>, now: DateTime<Utc>) -> Patch {
        let elapsed = (now - started).num_milliseconds() as f64 / 1000.0;
        let patch = results
            .set("status", self.complete)
            .set_json(self.end_field(), &now)
            .set(self.duration_field(), elapsed)
            .clear(LEASE_FIELD);
        if self.count_attempt_on_success {
            patch.inc(self.attempts_field(), 1)
        } else {
            patch
        }
    }

    /// Outcome of a failed attempt given the attempts recorded before it.
    pub fn failure_kind(&self, attempts_before: u32, max_attempts: u32) -> Failure {
        if attempts_before + 1 >= max_attempts {
            Failure::Exhausted
        } else {
            Failure::Requeued
        }
    }

    pub fn failure_patch(&self, failure: Failure, now: DateTime<Utc>) -> Patch {
        let status = match failure {
            Failure::Requeued => self.retry_target,
            Failure::Exhausted => self.failed,
        };
        Patch::new()
            .set("status", status)
            .inc(self.attempts_field(), 1)
            .set_json(self.end_field(), &now)
            .clear(LEASE_FIELD)
    }

    /// Hand a record back untouched when its precondition is not met yet.
    pub fn release_patch(&self) -> Patch {
        Patch::new()
            .set("status", self.eligible)
            .clear(self.start_field())
            .clear(LEASE_FIELD)
    }

    /// Matches record `id` only while the claim stamped at `started` still
    /// owns it. A record the sweeper settled, or another worker re-claimed,
    /// no longer matches.
    pub fn claim_guard(&self, id: &str, started: DateTime<Utc>) -> Filter {
        let stamp = serde_json::to_value(started).unwrap_or(Value::Null);
        Filter::eq("id", id)
            .and(Filter::is_in("status", self.in_flight()))
            .and(Filter::eq(self.start_field(), stamp))
    }

    /// In-flight claims whose lease ran out before `now_ms`.
    pub fn expired_filter(&self, now_ms: i64) -> Filter {
        Filter::is_in("status", self.in_flight()).and(Filter::lt(LEASE_FIELD, now_ms))
    }
}

pub const DESCRIBE: StageSpec = StageSpec {
    name: "describe",
    collection: Collection::Uploads,
    eligible: UploadStatus::Uploaded.as_str(),
    claimed: UploadStatus::DescriptionStarted.as_str(),
    working: None,
    complete: UploadStatus::DescriptionComplete.as_str(),
    failed: UploadStatus::DescriptionFailed.as_str(),
    retry_target: UploadStatus::Uploaded.as_str(),
    timing: "description",
    count_attempt_on_success: false,
};

pub const CONVERT: StageSpec = StageSpec {
    name: "convert",
    collection: Collection::ConversionJobs,
    eligible: ConversionStatus::Requested.as_str(),
    claimed: ConversionStatus::ConversionStarted.as_str(),
    working: None,
    complete: ConversionStatus::Converted.as_str(),
    failed: ConversionStatus::ConversionFailed.as_str(),
    retry_target: ConversionStatus::Requested.as_str(),
    timing: "conversion",
    count_attempt_on_success: false,
};

pub const SPAWN_REQUEST: StageSpec = StageSpec {
    name: "spawn_request",
    collection: Collection::VideoRequests,
    eligible: RequestStatus::Requested.as_str(),
    claimed: RequestStatus::SpawningStarted.as_str(),
    working: None,
    complete: RequestStatus::SpawningCompleted.as_str(),
    failed: RequestStatus::SpawningFailed.as_str(),
    retry_target: RequestStatus::Requested.as_str(),
    timing: "spawning",
    count_attempt_on_success: false,
};

pub const SPAWN_FORMAT: StageSpec = StageSpec {
    name: "spawn_format",
    collection: Collection::VideoRequestFormats,
    eligible: FormatStatus::Requested.as_str(),
    claimed: FormatStatus::SpawningStarted.as_str(),
    working: None,
    complete: FormatStatus::SpawningComplete.as_str(),
    failed: FormatStatus::SpawningFailed.as_str(),
    retry_target: FormatStatus::Requested.as_str(),
    timing: "spawning",
    count_attempt_on_success: false,
};

pub const SCRIPT: StageSpec = StageSpec {
    name: "script",
    collection: Collection::Videos,
    eligible: VideoJobStatus::Requested.as_str(),
    claimed: VideoJobStatus::ScriptGenerationStarted.as_str(),
    working: None,
    complete: VideoJobStatus::ScriptGenerationComplete.as_str(),
    failed: VideoJobStatus::ScriptGenerationFailed.as_str(),
    retry_target: VideoJobStatus::Requested.as_str(),
    timing: "script_generation",
    count_attempt_on_success: false,
};

/// Claims queue the video, processing marks it started. A failure keeps the
/// script and sends the video back to `script_generation_complete`.
pub const EXTRACT: StageSpec = StageSpec {
    name: "extract",
    collection: Collection::Videos,
    eligible: VideoJobStatus::ScriptGenerationComplete.as_str(),
    claimed: VideoJobStatus::SceneExtractionQueued.as_str(),
    working: Some(VideoJobStatus::SceneExtractionStarted.as_str()),
    complete: VideoJobStatus::SceneExtractionComplete.as_str(),
    failed: VideoJobStatus::SceneExtractionFailed.as_str(),
    retry_target: VideoJobStatus::ScriptGenerationComplete.as_str(),
    timing: "scene_extraction",
    count_attempt_on_success: true,
};

pub const NARRATE: StageSpec = StageSpec {
    name: "narrate",
    collection: Collection::Scenes,
    eligible: SceneStatus::Generated.as_str(),
    claimed: SceneStatus::NarrationStarted.as_str(),
    working: None,
    complete: SceneStatus::NarrationComplete.as_str(),
    failed: SceneStatus::SceneNarrationFailed.as_str(),
    retry_target: SceneStatus::Generated.as_str(),
    timing: "scene_narration",
    count_attempt_on_success: false,
};

pub const ASSEMBLE: StageSpec = StageSpec {
    name: "assemble",
    collection: Collection::Videos,
    eligible: VideoJobStatus::SceneExtractionComplete.as_str(),
    claimed: VideoJobStatus::ProcessingStarted.as_str(),
    working: None,
    complete: VideoJobStatus::ProcessingComplete.as_str(),
    failed: VideoJobStatus::ProcessingFailed.as_str(),
    retry_target: VideoJobStatus::SceneExtractionComplete.as_str(),
    timing: "render",
    count_attempt_on_success: false,
};

pub const ALL: [&StageSpec; 8] = [
    &DESCRIBE,
    &CONVERT,
    &SPAWN_REQUEST,
    &SPAWN_FORMAT,
    &SCRIPT,
    &EXTRACT,
    &NARRATE,
    &ASSEMBLE,
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn doc(v: Value) -> reel_store::Document {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_failure_ceiling() {
        assert_eq!(SCRIPT.failure_kind(0, 3), Failure::Requeued);
        assert_eq!(SCRIPT.failure_kind(1, 3), Failure::Requeued);
        assert_eq!(SCRIPT.failure_kind(2, 3), Failure::Exhausted);
        assert_eq!(SCRIPT.failure_kind(0, 1), Failure::Exhausted);
    }

    #[test]
    fn test_claim_guard_tracks_ownership() {
        let started = Utc::now();
        let mut d = doc(json!({"id": "v1", "status": "requested"}));
        SCRIPT.claim_patch(started, 0).apply(&mut d);

        let guard = SCRIPT.claim_guard("v1", started);
        assert!(guard.matches(&d));
        assert!(!SCRIPT.claim_guard("v2", started).matches(&d));

        // Re-claimed by someone else after the lease lapsed.
        let later = started + chrono::Duration::seconds(90);
        let mut stolen = d.clone();
        SCRIPT.claim_patch(later, 0).apply(&mut stolen);
        assert!(!guard.matches(&stolen));

        SCRIPT.failure_patch(Failure::Requeued, later).apply(&mut d);
        assert!(!guard.matches(&d));
    }

    #[test]
    fn test_extraction_failure_reverts_two_steps() {
        let mut d = doc(json!({"status": "scene_extraction_started", "scene_extraction_attempts": 0}));
        EXTRACT.failure_patch(Failure::Requeued, Utc::now()).apply(&mut d);
        assert_eq!(d["status"], "script_generation_complete");
        assert_eq!(d["scene_extraction_attempts"], 1);
    }

    #[test]
    fn test_extraction_success_counts_attempt() {
        let mut d = doc(json!({"status": "scene_extraction_started", "scene_extraction_attempts": 1}));
        let now = Utc::now();
        EXTRACT.complete_patch(Patch::new(), now, now).apply(&mut d);
        assert_eq!(d["status"], "scene_extraction_complete");
        assert_eq!(d["scene_extraction_attempts"], 2);

        let mut d = doc(json!({"status": "narration_started", "scene_narration_attempts": 1}));
        NARRATE.complete_patch(Patch::new(), now, now).apply(&mut d);
        assert_eq!(d["scene_narration_attempts"], 1);
    }

    #[test]
    fn test_claim_patch_stamps_timing_and_lease() {
        let mut d = doc(json!({"status": "uploaded", "description_end_time": "earlier"}));
        DESCRIBE.claim_patch(Utc::now(), 42).apply(&mut d);
        assert_eq!(d["status"], "description_started");
        assert_eq!(d["description_end_time"], Value::Null);
        assert!(d["description_start_time"].is_string());
        assert_eq!(d[LEASE_FIELD], 42);
    }

    #[test]
    fn test_eligible_and_expired_filters() {
        let f = NARRATE.eligible_filter(3);
        assert!(f.matches(&doc(json!({"status": "generated", "scene_narration_attempts": 2}))));
        assert!(!f.matches(&doc(json!({"status": "generated", "scene_narration_attempts": 3}))));

        let expired = EXTRACT.expired_filter(1_000);
        assert!(expired.matches(&doc(json!({"status": "scene_extraction_started", "lease_expires_at_ms": 999}))));
        assert!(expired.matches(&doc(json!({"status": "scene_extraction_queued", "lease_expires_at_ms": 10}))));
        assert!(!expired.matches(&doc(json!({"status": "scene_extraction_started", "lease_expires_at_ms": 1_000}))));
        assert!(!expired.matches(&doc(json!({"status": "scene_extraction_complete", "lease_expires_at_ms": 1}))));
    }

    #[test]
    fn test_table_statuses_are_distinct_per_row() {
        for spec in ALL {
            assert_ne!(spec.eligible, spec.claimed, "{}", spec.name);
            assert_ne!(spec.complete, spec.failed, "{}", spec.name);
            assert!(spec.retry_target != spec.complete, "{}", spec.name);
        }
    }
}
