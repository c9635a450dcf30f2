//! Worker error types.

use cstudio_compose::ComposeError;
use cstudio_media::MediaError;
use cstudio_queue::QueueError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// Request data the pipeline cannot act on
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Composition error: {0}")]
    Compose(#[from] ComposeError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Stopped by a cancellation signal rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        match self {
            WorkerError::Cancelled => true,
            WorkerError::Media(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// Failures that repeat identically on every attempt: bad input,
    /// impossible plans and undecodable payloads.
    pub fn is_permanent(&self) -> bool {
        match self {
            WorkerError::InvalidInput(_)
            | WorkerError::ConfigError(_)
            | WorkerError::Compose(_)
            | WorkerError::Json(_) => true,
            WorkerError::Media(e) => e.is_compile_error(),
            WorkerError::Queue(e) => matches!(e, QueueError::MalformedJob(_) | QueueError::InvalidConfig(_)),
            _ => false,
        }
    }

    /// Execution and transient transport failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Queue(e) => e.is_transient(),
            _ => !self.is_permanent() && !self.is_cancelled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_taxonomy() {
        let input: WorkerError = ComposeError::NoCandidates.into();
        assert!(input.is_permanent());
        assert!(!input.is_retryable());

        let compile: WorkerError = MediaError::EmptyTimeline.into();
        assert!(compile.is_permanent());

        let exec: WorkerError = MediaError::ffmpeg_failed("exit 1", None, Some(1)).into();
        assert!(exec.is_retryable());
        assert!(!exec.is_permanent());

        let cancelled: WorkerError = MediaError::Cancelled.into();
        assert!(cancelled.is_cancelled());
        assert!(!cancelled.is_retryable());

        let malformed: WorkerError = QueueError::malformed("bad").into();
        assert!(malformed.is_permanent());
        assert!(!malformed.is_retryable());

        let dropped: WorkerError = QueueError::connection_failed("reset").into();
        assert!(dropped.is_retryable());
    }
}
