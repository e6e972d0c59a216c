//! Persisted collections and the entity binding to them.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// One logical collection per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    VideoRequests,
    VideoRequestFormats,
    Uploads,
    ConversionJobs,
    Assets,
    Videos,
    Scenes,
}

impl Collection {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Collection::VideoRequests => "video_requests",
            Collection::VideoRequestFormats => "video_request_formats",
            Collection::Uploads => "uploads",
            Collection::ConversionJobs => "video_request_aspect_ratios",
            Collection::Assets => "assets",
            Collection::Videos => "videos",
            Collection::Scenes => "scenes",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A record type stored in exactly one collection, keyed by its id.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id_str(&self) -> &str;
}
