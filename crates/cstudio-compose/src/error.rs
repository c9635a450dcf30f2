//! Error types for clip selection and composition.

use cstudio_models::ClipId;
use thiserror::Error;

/// Result type for composition operations.
pub type ComposeResult<T> = Result<T, ComposeError>;

/// Errors raised while selecting clips or composing a timeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComposeError {
    #[error("No candidate clips supplied")]
    NoCandidates,

    #[error("No clip meets the minimum clip duration of {min_clip_duration:.2}s")]
    NoEligibleClips { min_clip_duration: f64 },

    #[error("Selected clip {0} is not among the candidates")]
    UnknownClip(ClipId),

    #[error("Invalid segment: {0}")]
    InvalidSegment(String),
}

impl ComposeError {
    pub fn invalid_segment(msg: impl Into<String>) -> Self {
        Self::InvalidSegment(msg.into())
    }
}
