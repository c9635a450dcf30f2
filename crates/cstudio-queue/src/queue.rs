//! Typed job queue: priority, message TTL, retry counting and dead-lettering.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cstudio_models::JobKind;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{Delivery, QueueBackend};
use crate::error::{QueueError, QueueResult};
use crate::job::{Job, DEFAULT_MAX_RETRY};
use crate::memory::MemoryBackend;
use crate::redis_backend::RedisBackend;

/// Default delivery lease. Longer than the worker's default job timeout so
/// a slow render is not reclaimed while it is still running.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(7200);

/// Transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Redis,
    Memory,
}

impl FromStr for BackendKind {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(BackendKind::Redis),
            "memory" => Ok(BackendKind::Memory),
            other => Err(QueueError::InvalidConfig(format!(
                "unknown queue backend '{}' (expected redis or memory)",
                other
            ))),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: BackendKind,
    /// Redis URL
    pub redis_url: String,
    /// Prefix for every Redis key
    pub key_prefix: String,
    /// Age after which an undelivered message is dead-lettered, counted
    /// from publish or from its last reclaim; zero disables
    pub message_ttl: Duration,
    /// Retry limit given to submitted jobs
    pub default_max_retry: u32,
    /// Redis polling interval while waiting for work
    pub poll_interval: Duration,
    /// How long a delivery may stay unacknowledged before it is reclaimed
    pub lease: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Redis,
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "cstudio".to_string(),
            message_ttl: Duration::from_secs(1800), // 30 minutes
            default_max_retry: DEFAULT_MAX_RETRY,
            poll_interval: Duration::from_millis(250),
            lease: DEFAULT_LEASE,
        }
    }
}

impl QueueConfig {
    /// In-memory transport with default limits.
    pub fn memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            ..Self::default()
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        let defaults = Self::default();
        let backend = match std::env::var("QUEUE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.backend,
        };

        let config = Self {
            backend,
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            message_ttl: env_parse("QUEUE_MESSAGE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.message_ttl),
            default_max_retry: env_parse("QUEUE_DEFAULT_MAX_RETRY")
                .map(|v: u64| v as u32)
                .unwrap_or(defaults.default_max_retry),
            poll_interval: env_parse("QUEUE_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            lease: env_parse("QUEUE_LEASE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lease),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the transports cannot honour.
    pub fn validate(&self) -> QueueResult<()> {
        if self.lease.is_zero() {
            return Err(QueueError::InvalidConfig(
                "delivery lease must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// A decoded job together with the delivery that carried it.
#[derive(Debug, Clone)]
pub struct ReceivedJob {
    pub job: Job,
    pub delivery: Delivery,
}

/// What happened to a failed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Republished for another attempt with this retry count
    Retried { retry: u32 },
    /// Routed to the dead-letter path; never delivered again
    DeadLettered { reason: String },
}

/// Job queue client. Cheap to clone; clones share one transport.
#[derive(Clone)]
pub struct JobQueue {
    backend: Arc<dyn QueueBackend>,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(backend: Arc<dyn QueueBackend>, config: QueueConfig) -> Self {
        Self { backend, config }
    }

    /// Open the transport named by `config`.
    pub async fn connect(config: QueueConfig) -> QueueResult<Self> {
        let backend: Arc<dyn QueueBackend> = match config.backend {
            BackendKind::Memory => Arc::new(MemoryBackend::new().with_lease(config.lease)),
            BackendKind::Redis => Arc::new(
                RedisBackend::connect(
                    &config.redis_url,
                    config.key_prefix.clone(),
                    config.lease,
                    config.poll_interval,
                )
                .await?,
            ),
        };
        info!(backend = backend.name(), "Job queue ready");
        Ok(Self::new(backend, config))
    }

    /// Create from environment variables.
    pub async fn from_env() -> QueueResult<Self> {
        Self::connect(QueueConfig::from_env()?).await
    }

    /// In-memory queue with default limits.
    pub fn memory() -> Self {
        let config = QueueConfig::memory();
        Self::new(Arc::new(MemoryBackend::new().with_lease(config.lease)), config)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn QueueBackend> {
        &self.backend
    }

    /// Publish `job` to its kind's queue.
    pub async fn enqueue(&self, job: &Job) -> QueueResult<String> {
        let queue = job.kind().queue_name();
        let body = job.to_json()?;
        let message_id = self.backend.publish(queue, &body, job.priority).await?;

        info!(
            job_id = %job.id,
            queue,
            priority = job.priority,
            retry = job.retry,
            "Enqueued job with message ID {}",
            message_id
        );
        Ok(message_id)
    }

    /// Wait up to `wait` for the next job of `kind`.
    ///
    /// Expired, malformed and misrouted messages are dead-lettered here and
    /// never reach a handler.
    pub async fn receive(&self, kind: JobKind, wait: Duration) -> QueueResult<Option<ReceivedJob>> {
        let queue = kind.queue_name();
        let deadline = Instant::now() + wait;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(delivery) = self.backend.receive(queue, remaining).await? else {
                return Ok(None);
            };

            if self.is_expired(&delivery) {
                warn!(queue, id = %delivery.id, "Message exceeded TTL");
                self.backend.dead_letter(&delivery, "expired").await?;
                continue;
            }

            let job = match Job::from_json(&delivery.body) {
                Ok(job) => job,
                Err(e) => {
                    warn!(queue, id = %delivery.id, "Failed to parse job payload: {}", e);
                    self.backend.dead_letter(&delivery, &e.to_string()).await?;
                    continue;
                }
            };

            if job.kind() != kind {
                let reason = format!("job type {} does not belong on queue {}", job.kind(), queue);
                warn!(job_id = %job.id, "{}", reason);
                self.backend.dead_letter(&delivery, &reason).await?;
                continue;
            }

            debug!(job_id = %job.id, queue, retry = job.retry, "Consumed job");
            return Ok(Some(ReceivedJob { job, delivery }));
        }
    }

    fn is_expired(&self, delivery: &Delivery) -> bool {
        if self.config.message_ttl.is_zero() {
            return false;
        }
        let age = (Utc::now() - delivery.published_at).to_std().unwrap_or_default();
        age > self.config.message_ttl
    }

    /// Acknowledge a job (mark as completed).
    pub async fn ack(&self, received: &ReceivedJob) -> QueueResult<()> {
        self.backend.ack(&received.delivery).await?;
        debug!(job_id = %received.job.id, "Acknowledged job");
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// A retryable failure republishes the job with its retry count
    /// incremented, unless that count reaches `max_retry`. Anything else
    /// goes to the dead-letter path.
    pub async fn fail(
        &self,
        received: &ReceivedJob,
        error: &str,
        retryable: bool,
    ) -> QueueResult<FailureOutcome> {
        let job = &received.job;

        if !retryable {
            return self.dead_letter(received, error.to_string()).await;
        }

        let next = job.next_attempt();
        if next.retry >= job.max_retry {
            let reason = format!("retries exhausted ({}/{}): {}", next.retry, job.max_retry, error);
            return self.dead_letter(received, reason).await;
        }

        self.enqueue(&next).await?;
        self.backend.ack(&received.delivery).await?;

        warn!(
            job_id = %job.id,
            retry = next.retry,
            max_retry = job.max_retry,
            "Job failed, scheduled retry: {}",
            error
        );
        Ok(FailureOutcome::Retried { retry: next.retry })
    }

    /// Put a job back untouched, e.g. when its worker is shutting down.
    pub async fn release(&self, received: &ReceivedJob) -> QueueResult<()> {
        self.enqueue(&received.job).await?;
        self.backend.ack(&received.delivery).await?;
        info!(job_id = %received.job.id, "Released job back to queue");
        Ok(())
    }

    async fn dead_letter(&self, received: &ReceivedJob, reason: String) -> QueueResult<FailureOutcome> {
        self.backend.dead_letter(&received.delivery, &reason).await?;
        warn!(job_id = %received.job.id, "Moved job to DLQ: {}", reason);
        Ok(FailureOutcome::DeadLettered { reason })
    }

    /// Get queue length.
    pub async fn len(&self, kind: JobKind) -> QueueResult<u64> {
        self.backend.len(kind.queue_name()).await
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self, kind: JobKind) -> QueueResult<u64> {
        self.backend.dlq_len(kind.queue_name()).await
    }

    /// Return deliveries with expired leases to the pending set.
    pub async fn reclaim_expired(&self, kind: JobKind) -> QueueResult<u64> {
        self.backend.reclaim_expired(kind.queue_name()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ThumbnailPayload;
    use cstudio_models::ClipId;
    use tokio_test::{assert_err, assert_ok};

    const WAIT: Duration = Duration::from_millis(50);

    fn memory_queue(config: QueueConfig) -> (JobQueue, MemoryBackend) {
        let backend = MemoryBackend::new();
        (JobQueue::new(Arc::new(backend.clone()), config), backend)
    }

    fn thumbnail(clip: u64) -> Job {
        Job::thumbnail(ThumbnailPayload {
            clip_id: ClipId(clip),
            time_offset: 0.0,
        })
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(assert_ok!("Memory".parse::<BackendKind>()), BackendKind::Memory);
        assert_err!("kafka".parse::<BackendKind>());
    }

    #[tokio::test]
    async fn test_higher_priority_first() {
        let queue = JobQueue::memory();
        let low = thumbnail(1).with_priority(1);
        let high = thumbnail(2).with_priority(12);
        assert_ok!(queue.enqueue(&low).await);
        assert_ok!(queue.enqueue(&high).await);

        let first = queue.receive(JobKind::GenerateThumbnail, WAIT).await.unwrap().unwrap();
        assert_eq!(first.job.id, high.id);
        assert_eq!(first.job.priority, 10);
    }

    #[tokio::test]
    async fn test_retry_then_dead_letter() {
        let (queue, backend) = memory_queue(QueueConfig::memory());
        let job = thumbnail(1).with_max_retry(3);
        queue.enqueue(&job).await.unwrap();

        let mut outcomes = Vec::new();
        while let Some(received) = queue.receive(JobKind::GenerateThumbnail, WAIT).await.unwrap() {
            outcomes.push(queue.fail(&received, "encoder crashed", true).await.unwrap());
        }

        assert_eq!(outcomes[0], FailureOutcome::Retried { retry: 1 });
        assert_eq!(outcomes[1], FailureOutcome::Retried { retry: 2 });
        assert!(matches!(outcomes[2], FailureOutcome::DeadLettered { .. }));
        assert_eq!(outcomes.len(), 3);
        assert_eq!(backend.dead_letters("thumbnail_generation").len(), 1);
        assert_eq!(backend.in_flight("thumbnail_generation"), 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_skips_retry() {
        let queue = JobQueue::memory();
        queue.enqueue(&thumbnail(1)).await.unwrap();
        let received = queue.receive(JobKind::GenerateThumbnail, WAIT).await.unwrap().unwrap();

        let outcome = queue.fail(&received, "no such clip", false).await.unwrap();
        assert_eq!(outcome, FailureOutcome::DeadLettered { reason: "no such clip".into() });
        assert_eq!(queue.len(JobKind::GenerateThumbnail).await.unwrap(), 0);
        assert_eq!(queue.dlq_len(JobKind::GenerateThumbnail).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_and_misrouted_are_dead_lettered() {
        let (queue, backend) = memory_queue(QueueConfig::memory());
        backend.publish("thumbnail_generation", "{not json", 5).await.unwrap();
        let render_body = r#"{"id":"r1","type":"render_video","payload":{"task_id":"t","project_id":"p","segments":[]},"created_at":"2024-05-01T12:00:00Z"}"#;
        backend.publish("thumbnail_generation", render_body, 5).await.unwrap();

        assert!(queue.receive(JobKind::GenerateThumbnail, WAIT).await.unwrap().is_none());
        assert_eq!(backend.dead_letters("thumbnail_generation").len(), 2);
    }

    #[tokio::test]
    async fn test_expired_messages_are_dead_lettered() {
        let config = QueueConfig {
            message_ttl: Duration::from_millis(1),
            ..QueueConfig::memory()
        };
        let (queue, backend) = memory_queue(config);
        queue.enqueue(&thumbnail(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(queue.receive(JobKind::GenerateThumbnail, WAIT).await.unwrap().is_none());
        assert_eq!(backend.dead_letters("thumbnail_generation")[0].reason, "expired");
    }

    #[tokio::test]
    async fn test_reclaimed_delivery_is_redelivered_not_expired() {
        // Lease longer than the TTL, as with the default settings.
        let config = QueueConfig {
            message_ttl: Duration::from_millis(40),
            lease: Duration::from_millis(80),
            ..QueueConfig::memory()
        };
        let backend = MemoryBackend::new().with_lease(config.lease);
        let queue = JobQueue::new(Arc::new(backend.clone()), config);
        let job = thumbnail(1);
        queue.enqueue(&job).await.unwrap();

        // The consumer takes the job and never settles it.
        let lost = queue.receive(JobKind::GenerateThumbnail, WAIT).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(queue.reclaim_expired(JobKind::GenerateThumbnail).await.unwrap(), 1);
        let again = queue.receive(JobKind::GenerateThumbnail, WAIT).await.unwrap().unwrap();
        assert_eq!(again.job.id, lost.job.id);
        assert_eq!(again.job.retry, 0);
        assert_eq!(queue.dlq_len(JobKind::GenerateThumbnail).await.unwrap(), 0);

        queue.ack(&again).await.unwrap();
        assert_eq!(backend.in_flight("thumbnail_generation"), 0);
    }

    #[test]
    fn test_default_lease_and_validation() {
        let config = QueueConfig::default();
        assert_eq!(config.lease, DEFAULT_LEASE);
        assert_ok!(config.validate());

        let zero = QueueConfig {
            lease: Duration::ZERO,
            ..QueueConfig::default()
        };
        assert!(matches!(zero.validate(), Err(QueueError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_release_keeps_retry_count() {
        let queue = JobQueue::memory();
        queue.enqueue(&thumbnail(1)).await.unwrap();
        let received = queue.receive(JobKind::GenerateThumbnail, WAIT).await.unwrap().unwrap();

        queue.release(&received).await.unwrap();

        let again = queue.receive(JobKind::GenerateThumbnail, WAIT).await.unwrap().unwrap();
        assert_eq!(again.job.id, received.job.id);
        assert_eq!(again.job.retry, 0);
    }
}
