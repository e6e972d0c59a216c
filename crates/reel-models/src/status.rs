//! Per-entity status machines.
//!
//! Status fields are the only cross-process coordination signal: each stage
//! polls for one status value and writes the next. The string forms are the
//! persisted representation and must stay stable.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// VideoRequest status.
///
/// Advances `pending -> requested -> spawning_started -> spawning_completed | spawning_failed`
/// and only regresses to `requested` on a retry-eligible spawning failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Created but not yet finalized by the uploader
    #[default]
    Pending,
    /// Finalized, waiting for spawning
    Requested,
    SpawningStarted,
    SpawningCompleted,
    SpawningFailed,
}

impl RequestStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Requested => "requested",
            RequestStatus::SpawningStarted => "spawning_started",
            RequestStatus::SpawningCompleted => "spawning_completed",
            RequestStatus::SpawningFailed => "spawning_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::SpawningCompleted | RequestStatus::SpawningFailed
        )
    }
}

/// VideoRequestFormat status, used by the format-level spawning variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormatStatus {
    #[default]
    Pending,
    Requested,
    SpawningStarted,
    SpawningComplete,
    SpawningFailed,
}

impl FormatStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FormatStatus::Pending => "pending",
            FormatStatus::Requested => "requested",
            FormatStatus::SpawningStarted => "spawning_started",
            FormatStatus::SpawningComplete => "spawning_complete",
            FormatStatus::SpawningFailed => "spawning_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FormatStatus::SpawningComplete | FormatStatus::SpawningFailed
        )
    }
}

/// Upload description status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    #[default]
    Uploaded,
    DescriptionStarted,
    DescriptionComplete,
    DescriptionFailed,
}

impl UploadStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::DescriptionStarted => "description_started",
            UploadStatus::DescriptionComplete => "description_complete",
            UploadStatus::DescriptionFailed => "description_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::DescriptionComplete | UploadStatus::DescriptionFailed
        )
    }
}

/// AspectRatioConversionJob status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    #[default]
    Pending,
    Requested,
    ConversionStarted,
    Converted,
    ConversionFailed,
}

impl ConversionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConversionStatus::Pending => "pending",
            ConversionStatus::Requested => "requested",
            ConversionStatus::ConversionStarted => "conversion_started",
            ConversionStatus::Converted => "converted",
            ConversionStatus::ConversionFailed => "conversion_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConversionStatus::Converted | ConversionStatus::ConversionFailed
        )
    }
}

/// Asset status. Assets are immutable once converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    #[default]
    Converted,
}

impl AssetStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Converted => "converted",
        }
    }
}

/// VideoJob status.
///
/// Scene narration progress is tracked on the scenes, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoJobStatus {
    #[default]
    Requested,
    ScriptGenerationStarted,
    ScriptGenerationComplete,
    ScriptGenerationFailed,
    SceneExtractionQueued,
    SceneExtractionStarted,
    SceneExtractionComplete,
    SceneExtractionFailed,
    ProcessingStarted,
    ProcessingComplete,
    ProcessingFailed,
}

impl VideoJobStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            VideoJobStatus::Requested => "requested",
            VideoJobStatus::ScriptGenerationStarted => "script_generation_started",
            VideoJobStatus::ScriptGenerationComplete => "script_generation_complete",
            VideoJobStatus::ScriptGenerationFailed => "script_generation_failed",
            VideoJobStatus::SceneExtractionQueued => "scene_extraction_queued",
            VideoJobStatus::SceneExtractionStarted => "scene_extraction_started",
            VideoJobStatus::SceneExtractionComplete => "scene_extraction_complete",
            VideoJobStatus::SceneExtractionFailed => "scene_extraction_failed",
            VideoJobStatus::ProcessingStarted => "processing_started",
            VideoJobStatus::ProcessingComplete => "processing_complete",
            VideoJobStatus::ProcessingFailed => "processing_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VideoJobStatus::ScriptGenerationFailed
                | VideoJobStatus::SceneExtractionFailed
                | VideoJobStatus::ProcessingComplete
                | VideoJobStatus::ProcessingFailed
        )
    }
}

/// Scene narration status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    #[default]
    Generated,
    NarrationStarted,
    NarrationComplete,
    SceneNarrationFailed,
}

impl SceneStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SceneStatus::Generated => "generated",
            SceneStatus::NarrationStarted => "narration_started",
            SceneStatus::NarrationComplete => "narration_complete",
            SceneStatus::SceneNarrationFailed => "scene_narration_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SceneStatus::NarrationComplete | SceneStatus::SceneNarrationFailed
        )
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.as_str())
                }
            }
        )*
    };
}

display_as_str!(
    RequestStatus,
    FormatStatus,
    UploadStatus,
    ConversionStatus,
    AssetStatus,
    VideoJobStatus,
    SceneStatus
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str_matches_serde() {
        let json = serde_json::to_string(&VideoJobStatus::SceneExtractionComplete).unwrap();
        assert_eq!(json, format!("\"{}\"", VideoJobStatus::SceneExtractionComplete.as_str()));

        let json = serde_json::to_string(&RequestStatus::SpawningCompleted).unwrap();
        assert_eq!(json, "\"spawning_completed\"");

        let json = serde_json::to_string(&SceneStatus::SceneNarrationFailed).unwrap();
        assert_eq!(json, "\"scene_narration_failed\"");
    }

    #[test]
    fn test_terminal_states() {
        assert!(UploadStatus::DescriptionFailed.is_terminal());
        assert!(!UploadStatus::DescriptionStarted.is_terminal());
        assert!(ConversionStatus::Converted.is_terminal());
        assert!(!VideoJobStatus::SceneExtractionComplete.is_terminal());
        assert!(VideoJobStatus::ProcessingComplete.is_terminal());
    }
}
