//! Record identifiers.
//!
//! Every persisted record is keyed by a globally unique string id. Each entity
//! gets its own newtype so a scene id can never be passed where a video id is
//! expected.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Create from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

record_id!(
    /// Identifier of a top-level video request.
    RequestId
);
record_id!(
    /// Identifier of a per-format spawning record.
    FormatId
);
record_id!(
    /// Identifier of a raw upload.
    UploadId
);
record_id!(
    /// Identifier of an aspect ratio conversion job.
    ConversionJobId
);
record_id!(
    /// Identifier of a converted asset.
    AssetId
);
record_id!(
    /// Identifier of a video job (one per request format).
    VideoJobId
);
record_id!(
    /// Identifier of a scene node.
    SceneId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(SceneId::new(), SceneId::new());
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = VideoJobId::from_string("video-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"video-1\"");
        let back: VideoJobId = serde_json::from_str("\"video-1\"").unwrap();
        assert_eq!(back, id);
    }
}
