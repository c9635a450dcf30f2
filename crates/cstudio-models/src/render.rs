//! Render options and encoding defaults.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Encoding preset when none is requested
pub const DEFAULT_PRESET: &str = "medium";
/// CRF for the medium tier and for unrecognized tiers
pub const DEFAULT_CRF: u8 = 23;
/// Audio bitrate (kbps) when none is requested
pub const DEFAULT_AUDIO_BITRATE_KBPS: u32 = 128;
/// Container when none is requested
pub const DEFAULT_OUTPUT_FORMAT: &str = "mp4";
/// Highest CRF accepted by libx264
pub const MAX_CRF: u8 = 51;

/// JPEG quality scale for thumbnails (2 = near lossless)
pub const THUMBNAIL_QUALITY: u8 = 2;

/// Named quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Low,
    Medium,
    High,
    Ultra,
}

impl QualityTier {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "ultra" => Some(Self::Ultra),
            _ => None,
        }
    }

    /// Fixed CRF for the tier.
    pub fn crf(&self) -> u8 {
        match self {
            QualityTier::Low => 28,
            QualityTier::Medium => 23,
            QualityTier::High => 18,
            QualityTier::Ultra => 15,
        }
    }
}

/// A user-supplied named filter with key/value parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct VideoFilter {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl VideoFilter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Serialize as `name=key1=val1:key2=val2`, keys in sorted order.
    pub fn to_filter_string(&self) -> String {
        if self.parameters.is_empty() {
            return self.name.clone();
        }

        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => format!("{}={}", key, s),
                other => format!("{}={}", key, other),
            })
            .collect();

        format!("{}={}", self.name, params.join(":"))
    }
}

/// Output encoding options for a render.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct RenderOptions {
    /// Container format ("mp4", "mov", "mkv", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,

    /// Named quality tier: low, medium, high, ultra
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 240.0))]
    pub frame_rate: Option<f64>,

    /// Video bitrate in kbps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_bitrate: Option<u32>,

    /// Audio bitrate in kbps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    /// Explicit CRF; overrides the quality tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(max = 51))]
    pub crf: Option<u8>,

    #[serde(default)]
    #[validate(nested)]
    pub filters: Vec<VideoFilter>,
}

impl RenderOptions {
    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = Some(crf);
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_filter(mut self, filter: VideoFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Recognized quality tier, if any.
    pub fn quality_tier(&self) -> Option<QualityTier> {
        self.quality.as_deref().and_then(QualityTier::parse)
    }

    /// Rate-control value: explicit CRF, else tier mapping, else the default.
    pub fn resolved_crf(&self) -> u8 {
        match self.crf {
            Some(crf) => crf.min(MAX_CRF),
            None => self
                .quality_tier()
                .map(|tier| tier.crf())
                .unwrap_or(DEFAULT_CRF),
        }
    }
}
