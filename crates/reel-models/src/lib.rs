//! Shared data models for the reel pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Record identifiers and per-entity status machines
//! - Video requests, uploads, conversion jobs, assets, videos and scenes
//! - Aspect ratio canvas settings
//! - Scene linked lists stored as an id-keyed arena

pub mod aspect_ratio;
pub mod asset;
pub mod collection;
pub mod conversion;
pub mod error;
pub mod ids;
pub mod metadata;
pub mod request;
pub mod scene;
pub mod scene_list;
pub mod status;
pub mod upload;
pub mod video;

pub use aspect_ratio::{AspectRatio, AspectRatioSettings};
pub use asset::Asset;
pub use collection::{Collection, Entity};
pub use conversion::AspectRatioConversionJob;
pub use error::{ModelError, ModelResult};
pub use ids::{AssetId, ConversionJobId, FormatId, RequestId, SceneId, UploadId, VideoJobId};
pub use metadata::{ImageMetadata, MediaKind, MediaMetadata, VideoMetadata};
pub use request::{FormatSpec, VideoRequest, VideoRequestFormat};
pub use scene::{Scene, SceneType, OUTRO_NARRATION};
pub use scene_list::SceneList;
pub use status::{
    AssetStatus, ConversionStatus, FormatStatus, RequestStatus, SceneStatus, UploadStatus,
    VideoJobStatus,
};
pub use upload::Upload;
pub use video::VideoJob;

/// Current wall-clock time in epoch milliseconds, used for claim leases.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
