//! Metrics for FFmpeg invocations.

use metrics::{counter, histogram};

pub const FFMPEG_RUNS_TOTAL: &str = "reel_media_ffmpeg_runs_total";
pub const FFMPEG_DURATION_SECONDS: &str = "reel_media_ffmpeg_duration_seconds";

/// Record one finished FFmpeg run.
pub fn record_ffmpeg_run(op: &'static str, success: bool, seconds: f64) {
    let status = if success { "success" } else { "error" };
    counter!(FFMPEG_RUNS_TOTAL, "op" => op, "status" => status).increment(1);
    histogram!(FFMPEG_DURATION_SECONDS, "op" => op).record(seconds);
}
