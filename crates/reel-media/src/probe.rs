//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Dimensions and timing of an image, video or audio file.
///
/// Audio-only files report zero dimensions. Still images report no duration
/// and no frame rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    /// Duration in seconds
    pub duration: Option<f64>,
    pub fps: Option<f64>,
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    #[serde(default)]
    disposition: Option<FfprobeDisposition>,
}

#[derive(Debug, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

/// Image demuxers, which report a nominal frame rate that means nothing.
const IMAGE_FORMATS: &[&str] = &["image2", "png_pipe", "jpeg_pipe", "webp_pipe", "bmp_pipe", "gif"];

/// Probe a media file.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let is_image = probe
        .format
        .as_ref()
        .and_then(|f| f.format_name.as_deref())
        .map(|name| name.split(',').any(|n| IMAGE_FORMATS.contains(&n) || n.ends_with("_pipe")))
        .unwrap_or(false);

    let video = probe.streams.iter().find(|s| {
        s.codec_type == "video" && s.disposition.as_ref().map_or(true, |d| d.attached_pic == 0)
    });
    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    if video.is_none() && !has_audio {
        return Err(MediaError::invalid_media("no audio or video stream found"));
    }

    let duration = if is_image {
        None
    } else {
        probe
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| *d > 0.0)
    };

    let fps = if is_image {
        None
    } else {
        video
            .and_then(|s| s.avg_frame_rate.as_deref().or(s.r_frame_rate.as_deref()))
            .and_then(parse_frame_rate)
    };

    Ok(MediaInfo {
        width: video.and_then(|s| s.width).unwrap_or(0),
        height: video.and_then(|s| s.height).unwrap_or(0),
        duration,
        fps,
        has_audio,
    })
}

/// Get media duration in seconds, failing for still images.
pub async fn get_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let path = path.as_ref();
    probe_media(path)
        .await?
        .duration
        .ok_or_else(|| MediaError::invalid_media(format!("{} has no duration", path.display())))
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
    }

    #[test]
    fn test_parse_video() {
        let json = br#"{
            "format": {"duration": "12.480000", "format_name": "mov,mp4,m4a,3gp,3g2,mj2"},
            "streams": [
                {"codec_type": "video", "width": 1920, "height": 1080, "avg_frame_rate": "30/1"},
                {"codec_type": "audio"}
            ]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.duration, Some(12.48));
        assert_eq!(info.fps, Some(30.0));
        assert!(info.has_audio);
    }

    #[test]
    fn test_parse_image_has_no_duration() {
        let json = br#"{
            "format": {"duration": "0.040000", "format_name": "png_pipe"},
            "streams": [{"codec_type": "video", "width": 800, "height": 600, "avg_frame_rate": "25/1"}]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!((info.width, info.height), (800, 600));
        assert_eq!(info.duration, None);
        assert_eq!(info.fps, None);
        assert!(!info.has_audio);
    }

    #[test]
    fn test_parse_audio_ignores_cover_art() {
        let json = br#"{
            "format": {"duration": "3.25", "format_name": "mp3"},
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 300, "height": 300, "disposition": {"attached_pic": 1}}
            ]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!((info.width, info.height), (0, 0));
        assert_eq!(info.duration, Some(3.25));
        assert!(info.has_audio);
    }

    #[test]
    fn test_parse_without_streams_fails() {
        let json = br#"{"format": {"format_name": "data"}, "streams": []}"#;
        assert!(matches!(parse_probe_output(json), Err(MediaError::InvalidMedia(_))));
    }
}
