//! Selected clip segments and the transitions attached to them.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ClipId;

/// Default easing curve for transitions.
pub const DEFAULT_EASING: &str = "ease-in-out";

/// Visual transition type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Cut,
    Dissolve,
    Fade,
    Slide,
    Wipe,
}

impl TransitionKind {
    /// Pool used by the dynamic transition style.
    pub const ALL: [TransitionKind; 5] = [
        TransitionKind::Fade,
        TransitionKind::Dissolve,
        TransitionKind::Slide,
        TransitionKind::Wipe,
        TransitionKind::Cut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Cut => "cut",
            TransitionKind::Dissolve => "dissolve",
            TransitionKind::Fade => "fade",
            TransitionKind::Slide => "slide",
            TransitionKind::Wipe => "wipe",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition between two adjacent segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Transition {
    #[serde(rename = "type")]
    pub kind: TransitionKind,
    /// Duration in seconds
    pub duration: f64,
    #[serde(default = "default_easing")]
    pub easing: String,
}

fn default_easing() -> String {
    DEFAULT_EASING.to_string()
}

impl Transition {
    pub fn new(kind: TransitionKind, duration: f64) -> Self {
        Self {
            kind,
            duration,
            easing: default_easing(),
        }
    }
}

/// A trimmed excerpt of a clip chosen for the composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipSegment {
    pub clip_id: ClipId,
    /// Start offset within the source clip (seconds)
    pub start_time: f64,
    /// End offset within the source clip (seconds)
    pub end_time: f64,
    /// `end_time - start_time`
    pub duration: f64,
    #[serde(default)]
    pub score: f64,
    /// Human-readable selection reason
    #[serde(default)]
    pub reason: String,
    /// Outgoing transitions attached by the timeline assembler
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl ClipSegment {
    /// Segment covering `[start, start + duration)` of a clip.
    pub fn new(clip_id: ClipId, start_time: f64, duration: f64) -> Self {
        Self {
            clip_id,
            start_time,
            end_time: start_time + duration,
            duration,
            score: 0.0,
            reason: String::new(),
            transitions: Vec::new(),
        }
    }

    pub fn with_score(mut self, score: f64, reason: impl Into<String>) -> Self {
        self.score = score;
        self.reason = reason.into();
        self
    }
}
