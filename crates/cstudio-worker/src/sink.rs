//! Write-only destination for render outcomes.

use std::path::PathBuf;

use async_trait::async_trait;
use cstudio_models::{JobId, JobState};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Outcome of a render job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRecord {
    pub job_id: JobId,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub file_size: u64,
    /// Rendered duration (seconds)
    pub duration: f64,
    pub status: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RenderRecord {
    pub fn failed(job_id: JobId, project_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            job_id,
            project_id: project_id.into(),
            output_path: None,
            file_size: 0,
            duration: 0.0,
            status: JobState::DeadLettered,
            error: Some(error.into()),
        }
    }
}

/// Receives finished renders. Fire-and-forget: implementations handle
/// their own failures.
#[async_trait]
pub trait RenderSink: Send + Sync {
    async fn record(&self, record: RenderRecord);
}

/// Writes each record as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRenderSink;

#[async_trait]
impl RenderSink for LogRenderSink {
    async fn record(&self, record: RenderRecord) {
        let output = record
            .output_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        match &record.error {
            None => info!(
                job_id = %record.job_id,
                project_id = %record.project_id,
                output = %output,
                size = record.file_size,
                duration = record.duration,
                status = %record.status,
                "Render recorded"
            ),
            Some(error) => warn!(
                job_id = %record.job_id,
                project_id = %record.project_id,
                status = %record.status,
                "Render failed: {}",
                error
            ),
        }
    }
}
