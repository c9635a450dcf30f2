//! Per-attempt job log lines.

use cstudio_models::{JobId, JobKind};
use cstudio_queue::Job;
use tracing::{error, info, warn, Span};

/// Tags every line of one delivery attempt with the job id, the job type
/// and `attempt/max_retry`.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    kind: JobKind,
    attempt: u32,
    max_retry: u32,
}

impl JobLogger {
    /// Attempts are numbered from 1, so the first delivery of a job with
    /// `retry == 0` is attempt 1.
    pub fn new(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            kind: job.kind(),
            attempt: job.retry + 1,
            max_retry: job.max_retry,
        }
    }

    pub fn log_start(&self) {
        info!(
            job_id = %self.job_id,
            job_type = self.kind.as_str(),
            attempt = self.attempt,
            max_retry = self.max_retry,
            "Attempt started"
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, job_type = self.kind.as_str(), "{}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            job_type = self.kind.as_str(),
            attempt = self.attempt,
            "{}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            job_type = self.kind.as_str(),
            attempt = self.attempt,
            max_retry = self.max_retry,
            "Attempt failed: {}", message
        );
    }

    pub fn log_completion(&self) {
        info!(
            job_id = %self.job_id,
            job_type = self.kind.as_str(),
            attempt = self.attempt,
            "Attempt completed"
        );
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Span wrapping the whole attempt, so handler and media logs inherit
    /// the job fields.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            job_type = self.kind.as_str(),
            attempt = self.attempt
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cstudio_queue::ThumbnailPayload;
    use cstudio_models::ClipId;

    #[test]
    fn test_attempt_numbering() {
        let job = Job::thumbnail(ThumbnailPayload {
            clip_id: ClipId(4),
            time_offset: 1.0,
        });
        let logger = JobLogger::new(&job);
        assert_eq!(logger.attempt(), 1);
        assert_eq!(logger.kind(), JobKind::GenerateThumbnail);

        let retried = JobLogger::new(&job.next_attempt().next_attempt());
        assert_eq!(retried.attempt(), 3);
    }
}
