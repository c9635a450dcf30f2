//! Job identity, type tags and lifecycle states.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting in queue
    #[default]
    Pending,
    /// Job is being processed
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed (may be retried)
    Failed,
    /// Job sent to the dead-letter path
    DeadLettered,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::DeadLettered => "dead_lettered",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::DeadLettered)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job type tag. Each kind is consumed from its own queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Select clips, assemble, compile and render
    SmartComposition,
    /// Render pre-selected segments
    RenderVideo,
    /// Extract a single frame from a clip
    GenerateThumbnail,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [
        JobKind::SmartComposition,
        JobKind::RenderVideo,
        JobKind::GenerateThumbnail,
    ];

    /// Wire value of the `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::SmartComposition => "smart_composition",
            JobKind::RenderVideo => "render_video",
            JobKind::GenerateThumbnail => "generate_thumbnail",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Queue this kind is published to.
    pub fn queue_name(&self) -> &'static str {
        match self {
            JobKind::SmartComposition => "smart_composition",
            JobKind::RenderVideo => "render_tasks",
            JobKind::GenerateThumbnail => "thumbnail_generation",
        }
    }

    /// Priority used when the submitter does not choose one.
    pub fn default_priority(&self) -> u8 {
        match self {
            JobKind::SmartComposition => 7,
            JobKind::RenderVideo => 8,
            JobKind::GenerateThumbnail => 2,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
