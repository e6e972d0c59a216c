//! Aspect ratio conversion for uploaded images and videos.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use reel_models::MediaKind;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::fs_utils::ensure_parent_dir;

/// How source media is fitted onto the target canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropMode {
    /// Scale down to fit and pad the rest with the background color.
    Contain,
    /// Scale up to fill and crop the overflow.
    Cover,
}

impl CropMode {
    /// Videos are letterboxed, images are cropped to fill.
    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => CropMode::Contain,
            MediaKind::Image => CropMode::Cover,
        }
    }
}

/// Filter chain that fits any input onto a `width`x`height` canvas.
pub fn fit_filter(width: u32, height: u32, mode: CropMode, bg_color: &str) -> String {
    match mode {
        CropMode::Contain => format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color={bg},setsar=1",
            w = width,
            h = height,
            bg = bg_color
        ),
        CropMode::Cover => format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1",
            w = width,
            h = height
        ),
    }
}

/// Convert `input` to a `target_w`x`target_h` file at `output`.
///
/// Images produce a single still frame; videos are re-encoded to H.264/AAC
/// with their audio track preserved.
pub async fn convert_to_aspect_ratio(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    kind: MediaKind,
    target_w: u32,
    target_h: u32,
    crop_mode: CropMode,
    bg_color: &str,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();
    ensure_parent_dir(output).await?;

    let cmd = build_convert_command(input, output, kind, target_w, target_h, crop_mode, bg_color);

    info!(
        input = %input.display(),
        output = %output.display(),
        kind = %kind,
        "Converting to {}x{} ({:?})",
        target_w,
        target_h,
        crop_mode
    );

    FfmpegRunner::new().run(&cmd).await
}

fn build_convert_command(
    input: &Path,
    output: &Path,
    kind: MediaKind,
    target_w: u32,
    target_h: u32,
    crop_mode: CropMode,
    bg_color: &str,
) -> FfmpegCommand {
    let filter = fit_filter(target_w, target_h, crop_mode, bg_color);
    let cmd = FfmpegCommand::new(input, output).video_filter(filter);

    match kind {
        MediaKind::Image => cmd.single_frame().label("convert_image"),
        MediaKind::Video => cmd
            .video_codec("libx264")
            .preset("veryfast")
            .crf(20)
            .output_args(["-pix_fmt", "yuv420p"])
            .audio_codec("aac")
            .audio_bitrate("192k")
            .output_args(["-movflags", "+faststart"])
            .label("convert_video"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contain_pads_with_background() {
        let f = fit_filter(1080, 1920, CropMode::Contain, "black");
        assert!(f.starts_with("scale=1080:1920:force_original_aspect_ratio=decrease"));
        assert!(f.contains("pad=1080:1920:(ow-iw)/2:(oh-ih)/2:color=black"));
    }

    #[test]
    fn test_cover_crops_to_fill() {
        let f = fit_filter(1080, 1080, CropMode::Cover, "black");
        assert_eq!(
            f,
            "scale=1080:1080:force_original_aspect_ratio=increase,crop=1080:1080,setsar=1"
        );
    }

    #[test]
    fn test_crop_mode_by_kind() {
        assert_eq!(CropMode::for_kind(MediaKind::Video), CropMode::Contain);
        assert_eq!(CropMode::for_kind(MediaKind::Image), CropMode::Cover);
    }

    #[test]
    fn test_image_conversion_writes_one_frame() {
        let cmd = build_convert_command(
            Path::new("in.png"),
            Path::new("out.png"),
            MediaKind::Image,
            1080,
            1920,
            CropMode::Cover,
            "black",
        );
        let args = cmd.build_args();
        assert!(args.windows(2).any(|w| w == ["-frames:v", "1"]));
        assert!(!args.contains(&"libx264".to_string()));
    }

    #[test]
    fn test_video_conversion_keeps_audio() {
        let cmd = build_convert_command(
            Path::new("in.mov"),
            Path::new("out.mov"),
            MediaKind::Video,
            1920,
            1080,
            CropMode::Contain,
            "black",
        );
        let args = cmd.build_args();
        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
    }
}
