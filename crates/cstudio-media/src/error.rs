//! Error types for media operations.

use std::path::PathBuf;

use cstudio_models::ClipId;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while compiling or executing a render.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Encoder not found: {0}")]
    EncoderNotFound(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Timeline has no clips to render")]
    EmptyTimeline,

    #[error("Source for clip {0} is not available")]
    MissingSource(ClipId),

    #[error("Invalid segment: {0}")]
    InvalidSegment(String),

    #[error("Invalid render options: {0}")]
    InvalidOptions(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn invalid_segment(message: impl Into<String>) -> Self {
        Self::InvalidSegment(message.into())
    }

    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Plan could not be built; raised before any process is spawned.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            MediaError::EmptyTimeline
                | MediaError::MissingSource(_)
                | MediaError::InvalidSegment(_)
                | MediaError::InvalidOptions(_)
                | MediaError::UnsupportedFormat(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled)
    }
}
