//! FFmpeg CLI wrapper for reel media.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - FFprobe metadata for images, videos and audio
//! - Aspect ratio conversion (letterbox or crop-to-fill)
//! - Frame sampling for vision description
//! - Scene clip rendering (title cards, slideshows, speech clips, subtitles)
//! - Final cut concatenation

pub mod command;
pub mod concat;
pub mod convert;
pub mod error;
pub mod frames;
pub mod fs_utils;
pub mod metrics;
pub mod probe;
pub mod render;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use concat::concatenate;
pub use convert::{convert_to_aspect_ratio, fit_filter, CropMode};
pub use error::{MediaError, MediaResult};
pub use frames::extract_frames;
pub use probe::{get_duration, probe_media, MediaInfo};
pub use render::{
    plan_segments, render_body, render_title_card, subtitle_phrases, wrap_text, BodyClip, Canvas,
    SceneAudio, Segment, TitleCard, Visual, IMAGE_SLOT_SECS,
};
