//! Periodic frame sampling for vision description.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::list_files_with_extension;

/// Width sampled frames are scaled to before being sent for description.
const FRAME_WIDTH: u32 = 768;

/// Write one JPEG every `interval_secs` of `input` into `out_dir`.
///
/// Returns the frame paths in playback order. A clip shorter than the
/// interval still yields its first frame.
pub async fn extract_frames(
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    interval_secs: f64,
) -> MediaResult<Vec<PathBuf>> {
    let out_dir = out_dir.as_ref();
    if interval_secs <= 0.0 {
        return Err(MediaError::invalid_media("frame interval must be positive"));
    }
    fs::create_dir_all(out_dir).await?;

    let cmd = build_frames_command(input.as_ref(), out_dir, interval_secs);
    FfmpegRunner::new().run(&cmd).await?;

    let frames = list_files_with_extension(out_dir, "jpg").await?;
    if frames.is_empty() {
        return Err(MediaError::invalid_media("no frames extracted"));
    }
    Ok(frames)
}

fn build_frames_command(input: &Path, out_dir: &Path, interval_secs: f64) -> FfmpegCommand {
    FfmpegCommand::new(input, out_dir.join("frame_%04d.jpg"))
        .video_filter(format!("fps=1/{},scale={}:-2", interval_secs, FRAME_WIDTH))
        .output_args(["-q:v", "3"])
        .label("extract_frames")
}
