//! Priority job queue with retry and dead-letter routing.
//!
//! This crate provides:
//! - The job wire envelope and typed payloads, decoded on dequeue
//! - A `QueueBackend` transport trait with Redis and in-memory implementations
//! - `JobQueue`: priority ordering, message TTL, retry counting, dead-lettering
//! - Progress events via Redis Pub/Sub or an in-process broadcast channel

pub mod backend;
pub mod error;
pub mod job;
pub mod memory;
pub mod progress;
pub mod queue;
pub mod redis_backend;

pub use backend::{DeadLetter, Delivery, QueueBackend};
pub use error::{QueueError, QueueResult};
pub use job::{
    CompositionPayload, Job, JobEnvelope, JobPayload, RenderPayload, ThumbnailPayload,
    DEFAULT_MAX_RETRY, MAX_PRIORITY,
};
pub use memory::MemoryBackend;
pub use progress::{
    JobProgress, LocalProgressPublisher, ProgressEvent, ProgressMessage, ProgressPublisher,
    RedisProgressPublisher,
};
pub use queue::{BackendKind, FailureOutcome, JobQueue, QueueConfig, ReceivedJob, DEFAULT_LEASE};
pub use redis_backend::RedisBackend;
