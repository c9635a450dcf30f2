//! Queue transport abstraction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueResult;

/// A message handed to a consumer. It stays in flight until acked,
/// dead-lettered or reclaimed.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Transport-assigned message id
    pub id: String,
    pub queue: String,
    pub body: String,
    pub published_at: DateTime<Utc>,
}

/// A message on a dead-letter path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub queue: String,
    pub body: String,
    pub reason: String,
    pub original_id: String,
    pub failed_at: DateTime<Utc>,
}

/// Priority message transport.
///
/// Higher priorities are delivered first; equal priorities are FIFO.
/// Implementations must tolerate concurrent calls from many workers
/// sharing one handle.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Publish `body` with `priority` (0-10). Returns the message id.
    async fn publish(&self, queue: &str, body: &str, priority: u8) -> QueueResult<String>;

    /// Wait up to `wait` for the next message.
    async fn receive(&self, queue: &str, wait: Duration) -> QueueResult<Option<Delivery>>;

    /// Remove a delivered message for good.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Move a delivered message to the queue's dead-letter path.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> QueueResult<()>;

    /// Messages waiting to be delivered.
    async fn len(&self, queue: &str) -> QueueResult<u64>;

    /// Messages on the dead-letter path.
    async fn dlq_len(&self, queue: &str) -> QueueResult<u64>;

    /// Return deliveries whose consumer went away to the pending set.
    async fn reclaim_expired(&self, _queue: &str) -> QueueResult<u64> {
        Ok(0)
    }

    fn name(&self) -> &'static str;
}
