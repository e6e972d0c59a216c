//! Metrics for outbound AI calls.

use metrics::{counter, histogram};

pub const AI_REQUESTS_TOTAL: &str = "reel_ai_requests_total";
pub const AI_REQUEST_SECONDS: &str = "reel_ai_request_seconds";

pub fn record_request(provider: &'static str, model: &str, success: bool, seconds: f64) {
    let status = if success { "success" } else { "error" };
    counter!(
        AI_REQUESTS_TOTAL,
        "provider" => provider,
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);
    histogram!(AI_REQUEST_SECONDS, "provider" => provider).record(seconds);
}
