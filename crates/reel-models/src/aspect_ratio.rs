//! Target aspect ratios and their canvas settings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// A supported output aspect ratio.
///
/// Determines both conversion geometry and the rendering canvas size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub enum AspectRatio {
    /// Vertical video for TikTok / Reels / Shorts
    #[serde(rename = "9x16")]
    Portrait,
    /// Landscape video for YouTube
    #[serde(rename = "16x9")]
    Landscape,
    /// Square video for Instagram feed
    #[serde(rename = "1x1")]
    Square,
}

/// Canvas and title-card layout settings for an aspect ratio.
///
/// Spacing and size values are fractions of the canvas height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectRatioSettings {
    pub screen_width: u32,
    pub screen_height: u32,
    pub top_spacing: f64,
    pub bottom_spacing: f64,
    pub logo_relative_size: f64,
    pub logo_bottom_spacing: f64,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 3] = [
        AspectRatio::Portrait,
        AspectRatio::Landscape,
        AspectRatio::Square,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Portrait => "9x16",
            AspectRatio::Landscape => "16x9",
            AspectRatio::Square => "1x1",
        }
    }

    pub const fn settings(&self) -> AspectRatioSettings {
        match self {
            AspectRatio::Portrait => AspectRatioSettings {
                screen_width: 1080,
                screen_height: 1920,
                top_spacing: 0.3,
                bottom_spacing: 0.8,
                logo_relative_size: 0.15,
                logo_bottom_spacing: 0.7,
            },
            AspectRatio::Landscape => AspectRatioSettings {
                screen_width: 1920,
                screen_height: 1080,
                top_spacing: 0.2,
                bottom_spacing: 0.75,
                logo_relative_size: 0.1,
                logo_bottom_spacing: 0.65,
            },
            AspectRatio::Square => AspectRatioSettings {
                screen_width: 1080,
                screen_height: 1080,
                top_spacing: 0.25,
                bottom_spacing: 0.75,
                logo_relative_size: 0.2,
                logo_bottom_spacing: 0.7,
            },
        }
    }

    /// Platform named in the script prompt.
    pub fn platform(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "YouTube",
            AspectRatio::Square => "Instagram",
            AspectRatio::Portrait => "TikTok",
        }
    }

    /// Width over height.
    pub fn as_f64(&self) -> f64 {
        let s = self.settings();
        s.screen_width as f64 / s.screen_height as f64
    }

    /// Pick the supported ratio closest to the given pixel dimensions.
    pub fn closest(width: u32, height: u32) -> Option<AspectRatio> {
        if width == 0 || height == 0 {
            return None;
        }
        let ratio = width as f64 / height as f64;
        Self::ALL.into_iter().min_by(|a, b| {
            let da = (a.as_f64() - ratio).abs();
            let db = (b.as_f64() - ratio).abs();
            da.total_cmp(&db)
        })
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(':', "x").as_str() {
            "9x16" => Ok(AspectRatio::Portrait),
            "16x9" => Ok(AspectRatio::Landscape),
            "1x1" => Ok(AspectRatio::Square),
            _ => Err(ModelError::InvalidAspectRatio(s.to_string())),
        }
    }
}
