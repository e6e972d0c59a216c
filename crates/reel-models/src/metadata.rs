//! Media metadata, shaped by content type.
//!
//! The shape is fixed when the upload is registered: an image upload can only
//! ever carry image metadata, a video upload only video metadata.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::aspect_ratio::AspectRatio;
use crate::error::ModelError;

/// Coarse media kind of an upload or asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    /// Detect the kind from a MIME type, falling back to the file extension.
    pub fn detect(mime_type: &str, extension: &str) -> Option<MediaKind> {
        let mime = mime_type.to_lowercase();
        if mime.starts_with("image/") {
            return Some(MediaKind::Image);
        }
        if mime.starts_with("video/") {
            return Some(MediaKind::Video);
        }

        match extension.trim_start_matches('.').to_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "webp" | "gif" | "bmp" => Some(MediaKind::Image),
            "mp4" | "mov" | "m4v" | "webm" | "mkv" | "avi" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            other => Err(ModelError::UnsupportedContentType(other.to_string())),
        }
    }
}

/// Image-specific metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImageMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub aspect_ratio: Option<AspectRatio>,
    #[serde(default)]
    pub is_logo: bool,
    #[serde(default)]
    pub is_profile_pic: bool,
}

/// Video-specific metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub aspect_ratio: Option<AspectRatio>,
    /// Duration in seconds
    pub duration: Option<f64>,
    pub fps: Option<f64>,
    #[serde(default)]
    pub has_speech: bool,
}

/// Metadata tagged by content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "content_type", rename_all = "snake_case")]
pub enum MediaMetadata {
    Image(ImageMetadata),
    Video(VideoMetadata),
}

impl MediaMetadata {
    /// Empty metadata of the shape required by `kind`.
    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Image => MediaMetadata::Image(ImageMetadata::default()),
            MediaKind::Video => MediaMetadata::Video(VideoMetadata::default()),
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            MediaMetadata::Image(_) => MediaKind::Image,
            MediaMetadata::Video(_) => MediaKind::Video,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, MediaMetadata::Video(_))
    }

    pub fn duration(&self) -> Option<f64> {
        match self {
            MediaMetadata::Video(v) => v.duration,
            MediaMetadata::Image(_) => None,
        }
    }

    pub fn is_logo(&self) -> bool {
        matches!(self, MediaMetadata::Image(i) if i.is_logo)
    }
}
