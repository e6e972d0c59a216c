//! Prometheus metrics for the stage workers.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Metric names as constants for consistency.
pub mod names {
    pub const RECORDS_CLAIMED_TOTAL: &str = "reel_records_claimed_total";
    pub const RECORDS_SETTLED_TOTAL: &str = "reel_records_settled_total";
    pub const PROCESSING_DURATION_SECONDS: &str = "reel_processing_duration_seconds";
    pub const IDLE_POLLS_TOTAL: &str = "reel_idle_polls_total";
    pub const LEASES_RECLAIMED_TOTAL: &str = "reel_leases_reclaimed_total";
    pub const SCENES_SPLIT_TOTAL: &str = "reel_scenes_split_total";
}

/// Install the Prometheus recorder with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

pub fn record_claimed(stage: &'static str, count: usize) {
    counter!(names::RECORDS_CLAIMED_TOTAL, "stage" => stage).increment(count as u64);
}

/// `outcome` is one of complete, skipped, requeued or failed.
pub fn record_settled(stage: &'static str, outcome: &'static str, duration_secs: f64) {
    counter!(names::RECORDS_SETTLED_TOTAL, "stage" => stage, "outcome" => outcome).increment(1);
    histogram!(names::PROCESSING_DURATION_SECONDS, "stage" => stage).record(duration_secs);
}

pub fn record_idle_poll(stage: &'static str) {
    counter!(names::IDLE_POLLS_TOTAL, "stage" => stage).increment(1);
}

pub fn record_lease_reclaimed(stage: &'static str, terminal: bool) {
    let outcome = if terminal { "failed" } else { "requeued" };
    counter!(names::LEASES_RECLAIMED_TOTAL, "stage" => stage, "outcome" => outcome).increment(1);
}

pub fn record_scene_split(count: usize) {
    counter!(names::SCENES_SPLIT_TOTAL).increment(count as u64);
}
