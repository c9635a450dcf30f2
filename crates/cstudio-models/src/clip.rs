//! Clip catalog records.

use std::fmt;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Identifier of a clip in the catalog.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct ClipId(pub u64);

impl ClipId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ClipId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// An analyzed source clip.
///
/// Clips are immutable once analyzed; the catalog owns them and this
/// pipeline only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Clip {
    /// Catalog identity
    pub id: ClipId,

    /// Display title
    #[serde(default)]
    pub title: String,

    /// Location of the source media
    pub file_path: PathBuf,

    /// Duration in seconds
    pub duration: f64,

    /// Content category (e.g. "nature", "city", "close_up")
    #[serde(default)]
    pub category: String,

    /// Declared mood (e.g. "calm", "energetic")
    #[serde(default)]
    pub mood: String,

    /// Visual style (e.g. "cinematic", "documentary")
    #[serde(default)]
    pub style: String,

    /// Dominant color
    #[serde(default)]
    pub color: String,

    /// Resolution as "WIDTHxHEIGHT"
    #[serde(default)]
    pub resolution: String,

    /// Bitrate in kbps
    #[serde(default)]
    pub bitrate: u32,

    /// Frame rate in fps
    #[serde(default)]
    pub frame_rate: f64,
}

impl Clip {
    /// Create a clip with only the fields required for rendering.
    pub fn new(id: impl Into<ClipId>, file_path: impl Into<PathBuf>, duration: f64) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            file_path: file_path.into(),
            duration,
            category: String::new(),
            mood: String::new(),
            style: String::new(),
            color: String::new(),
            resolution: String::new(),
            bitrate: 0,
            frame_rate: 0.0,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_mood(mut self, mood: impl Into<String>) -> Self {
        self.mood = mood.into();
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Set technical metadata.
    pub fn with_technical(mut self, resolution: impl Into<String>, bitrate: u32, frame_rate: f64) -> Self {
        self.resolution = resolution.into();
        self.bitrate = bitrate;
        self.frame_rate = frame_rate;
        self
    }

    /// Parse the declared resolution into (width, height).
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let (w, h) = self.resolution.trim().split_once(['x', 'X'])?;
        Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    }
}

/// Catalog lookup filter. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<ClipId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl ClipFilter {
    pub fn matches(&self, clip: &Clip) -> bool {
        fn field_matches(wanted: &Option<String>, actual: &str) -> bool {
            wanted
                .as_deref()
                .map_or(true, |w| w.is_empty() || w.eq_ignore_ascii_case(actual))
        }

        if let Some(ids) = &self.ids {
            if !ids.contains(&clip.id) {
                return false;
            }
        }

        field_matches(&self.category, &clip.category)
            && field_matches(&self.mood, &clip.mood)
            && field_matches(&self.style, &clip.style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions() {
        let clip = Clip::new(1, "a.mp4", 5.0).with_technical("1920x1080", 4000, 30.0);
        assert_eq!(clip.dimensions(), Some((1920, 1080)));

        let clip = Clip::new(2, "b.mp4", 5.0).with_technical("hd", 0, 0.0);
        assert_eq!(clip.dimensions(), None);
    }

    #[test]
    fn test_filter_matches() {
        let clip = Clip::new(7, "c.mp4", 8.0)
            .with_category("nature")
            .with_mood("calm");

        assert!(ClipFilter::default().matches(&clip));
        assert!(ClipFilter {
            category: Some("Nature".into()),
            ..Default::default()
        }
        .matches(&clip));
        assert!(!ClipFilter {
            mood: Some("energetic".into()),
            ..Default::default()
        }
        .matches(&clip));
        assert!(!ClipFilter {
            ids: Some(vec![ClipId(1)]),
            ..Default::default()
        }
        .matches(&clip));
    }

    #[test]
    fn test_clip_id_is_transparent() {
        let json = serde_json::to_string(&ClipId(42)).unwrap();
        assert_eq!(json, "42");
    }
}
