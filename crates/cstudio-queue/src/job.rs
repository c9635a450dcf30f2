//! Job envelope and typed payloads.
//!
//! On the wire every job is a JSON envelope
//! `{id, type, payload, priority, retry, max_retry, created_at}`. The payload
//! is decoded into [`JobPayload`] as soon as a message is received, so a bad
//! payload is rejected before any handler runs.

use chrono::{DateTime, Utc};
use cstudio_models::{
    ClipFilter, ClipId, ClipSegment, CompositionRequirement, JobId, JobKind, RenderOptions,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{QueueError, QueueResult};

/// Highest priority; larger values are clamped.
pub const MAX_PRIORITY: u8 = 10;

/// Attempts allowed before a job is dead-lettered.
pub const DEFAULT_MAX_RETRY: u32 = 3;

fn clamp_priority<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(raw.clamp(0, MAX_PRIORITY as i64) as u8)
}

/// Wire format of a queued job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub payload: serde_json::Value,
    #[serde(default, deserialize_with = "clamp_priority")]
    pub priority: u8,
    #[serde(default)]
    pub retry: u32,
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
    pub created_at: DateTime<Utc>,
}

fn default_max_retry() -> u32 {
    DEFAULT_MAX_RETRY
}

impl JobEnvelope {
    pub fn from_json(body: &str) -> QueueResult<Self> {
        serde_json::from_str(body).map_err(|e| QueueError::malformed(format!("invalid envelope: {}", e)))
    }

    pub fn to_json(&self) -> QueueResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Generate a composition from catalog clips and render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionPayload {
    pub project_id: String,
    pub requirement: CompositionRequirement,
    /// Selection strategy name; unknown names use the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// Candidate lookup filter
    #[serde(default)]
    pub filter: ClipFilter,
    #[serde(default)]
    pub render_options: RenderOptions,
    /// Output file stem; defaults to the job id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
}

/// Render segments that were already selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPayload {
    pub task_id: String,
    pub project_id: String,
    pub segments: Vec<ClipSegment>,
    /// "fast", "smooth", "dynamic" or empty for the default
    #[serde(default)]
    pub transition_style: String,
    #[serde(default)]
    pub render_options: RenderOptions,
}

/// Extract a preview frame from a clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailPayload {
    pub clip_id: ClipId,
    /// Offset into the clip (seconds)
    #[serde(default)]
    pub time_offset: f64,
}

/// Decoded payload, one shape per job type.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPayload {
    Composition(CompositionPayload),
    Render(RenderPayload),
    Thumbnail(ThumbnailPayload),
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Composition(_) => JobKind::SmartComposition,
            JobPayload::Render(_) => JobKind::RenderVideo,
            JobPayload::Thumbnail(_) => JobKind::GenerateThumbnail,
        }
    }

    fn decode(kind: JobKind, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            JobKind::SmartComposition => JobPayload::Composition(serde_json::from_value(value)?),
            JobKind::RenderVideo => JobPayload::Render(serde_json::from_value(value)?),
            JobKind::GenerateThumbnail => JobPayload::Thumbnail(serde_json::from_value(value)?),
        })
    }

    fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            JobPayload::Composition(p) => serde_json::to_value(p),
            JobPayload::Render(p) => serde_json::to_value(p),
            JobPayload::Thumbnail(p) => serde_json::to_value(p),
        }
    }
}

/// A decoded job.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub payload: JobPayload,
    pub priority: u8,
    pub retry: u32,
    pub max_retry: u32,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// New job with the kind's default priority and retry limit.
    pub fn new(payload: JobPayload) -> Self {
        Self {
            id: JobId::new(),
            priority: payload.kind().default_priority(),
            payload,
            retry: 0,
            max_retry: DEFAULT_MAX_RETRY,
            created_at: Utc::now(),
        }
    }

    pub fn composition(payload: CompositionPayload) -> Self {
        Self::new(JobPayload::Composition(payload))
    }

    pub fn render(payload: RenderPayload) -> Self {
        Self::new(JobPayload::Render(payload))
    }

    pub fn thumbnail(payload: ThumbnailPayload) -> Self {
        Self::new(JobPayload::Thumbnail(payload))
    }

    /// Set priority, clamped to [`MAX_PRIORITY`].
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(MAX_PRIORITY);
        self
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }

    /// The same job for its next attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            retry: self.retry.saturating_add(1),
            ..self.clone()
        }
    }

    pub fn to_envelope(&self) -> QueueResult<JobEnvelope> {
        Ok(JobEnvelope {
            id: self.id.to_string(),
            job_type: self.kind().as_str().to_string(),
            payload: self.payload.to_value()?,
            priority: self.priority.min(MAX_PRIORITY),
            retry: self.retry,
            max_retry: self.max_retry,
            created_at: self.created_at,
        })
    }

    pub fn to_json(&self) -> QueueResult<String> {
        self.to_envelope()?.to_json()
    }

    /// Decode a message body. Every failure is [`QueueError::MalformedJob`].
    pub fn from_json(body: &str) -> QueueResult<Self> {
        Self::try_from(JobEnvelope::from_json(body)?)
    }
}

impl TryFrom<JobEnvelope> for Job {
    type Error = QueueError;

    fn try_from(envelope: JobEnvelope) -> QueueResult<Self> {
        if envelope.id.trim().is_empty() {
            return Err(QueueError::malformed("empty job id"));
        }
        let kind = JobKind::parse(&envelope.job_type)
            .ok_or_else(|| QueueError::malformed(format!("unknown job type '{}'", envelope.job_type)))?;
        let payload = JobPayload::decode(kind, envelope.payload).map_err(|e| {
            QueueError::malformed(format!("invalid {} payload: {}", kind, e))
        })?;

        Ok(Self {
            id: JobId::from_string(envelope.id),
            payload,
            priority: envelope.priority.min(MAX_PRIORITY),
            retry: envelope.retry,
            max_retry: envelope.max_retry,
            created_at: envelope.created_at,
        })
    }
}
