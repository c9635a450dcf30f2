//! Composition requirements supplied per generation request.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What the caller wants the generated composition to look like.
///
/// String-typed knobs (`music_tempo`, `transition_style`) stay strings on the
/// wire so unknown values degrade to defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompositionRequirement {
    /// Target output duration in seconds
    #[serde(default)]
    pub target_duration: f64,

    /// Theme, matched against clip category
    #[serde(default)]
    pub theme: String,

    #[serde(default)]
    pub mood: String,

    #[serde(default)]
    pub style: String,

    #[serde(default)]
    pub primary_colors: Vec<String>,

    #[serde(default)]
    pub secondary_colors: Vec<String>,

    /// "slow", "medium" or "fast"
    #[serde(default)]
    pub music_tempo: String,

    /// "fast", "smooth", "dynamic"; anything else uses the default dissolve
    #[serde(default)]
    pub transition_style: String,

    #[serde(default)]
    pub min_clip_duration: f64,

    #[serde(default)]
    pub max_clip_duration: f64,

    /// Category -> target fraction of the output (e.g. {"close_up": 0.3})
    #[serde(default)]
    pub content_balance: BTreeMap<String, f64>,

    #[serde(default)]
    pub avoid_repetition: bool,

    #[serde(default)]
    pub prefer_high_quality: bool,
}

impl CompositionRequirement {
    /// Create a requirement with a duration budget and clip bounds.
    pub fn new(target_duration: f64, min_clip_duration: f64, max_clip_duration: f64) -> Self {
        Self {
            target_duration,
            min_clip_duration,
            max_clip_duration,
            ..Default::default()
        }
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = theme.into();
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

    pub fn with_transition_style(mut self, style: impl Into<String>) -> Self {
        self.transition_style = style.into();
        self
    }

    pub fn with_music_tempo(mut self, tempo: impl Into<String>) -> Self {
        self.music_tempo = tempo.into();
        self
    }

    pub fn with_avoid_repetition(mut self, avoid: bool) -> Self {
        self.avoid_repetition = avoid;
        self
    }

    /// Parsed transition style.
    pub fn transition(&self) -> TransitionStyle {
        TransitionStyle::parse(&self.transition_style)
    }

    /// Parsed tempo, if recognized.
    pub fn tempo(&self) -> Option<MusicTempo> {
        MusicTempo::parse(&self.music_tempo)
    }
}

/// How adjacent clips are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStyle {
    /// Hard cuts
    Fast,
    /// Long dissolves
    Smooth,
    /// Randomly varied short transitions
    Dynamic,
    /// Unset or unrecognized
    #[default]
    Default,
}

impl TransitionStyle {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "fast" => Self::Fast,
            "smooth" => Self::Smooth,
            "dynamic" => Self::Dynamic,
            _ => Self::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Smooth => "smooth",
            Self::Dynamic => "dynamic",
            Self::Default => "default",
        }
    }
}

/// Music tempo of the composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MusicTempo {
    Slow,
    Medium,
    Fast,
}

impl MusicTempo {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "slow" => Some(Self::Slow),
            "medium" => Some(Self::Medium),
            "fast" => Some(Self::Fast),
            _ => None,
        }
    }
}
