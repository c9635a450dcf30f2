//! In-process queue backend.
//!
//! Used by tests and single-process deployments (`QUEUE_BACKEND=memory`).
//! Nothing survives a restart.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::backend::{DeadLetter, Delivery, QueueBackend};
use crate::error::{QueueError, QueueResult};
use crate::job::MAX_PRIORITY;
use crate::queue::DEFAULT_LEASE;

#[derive(Debug)]
struct Pending {
    priority: u8,
    seq: u64,
    delivery: Delivery,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    // Max-heap: higher priority first, then lower sequence (older) first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A delivered message and when its lease runs out.
#[derive(Debug)]
struct Leased {
    priority: u8,
    seq: u64,
    delivery: Delivery,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: BinaryHeap<Pending>,
    in_flight: HashMap<String, Leased>,
    dead: Vec<DeadLetter>,
    notify: Arc<Notify>,
}

/// Priority queues held in memory.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    queues: Arc<Mutex<HashMap<String, QueueState>>>,
    seq: Arc<AtomicU64>,
    lease: Duration,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            queues: Arc::default(),
            seq: Arc::default(),
            lease: DEFAULT_LEASE,
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long a delivery may go unacknowledged before
    /// [`QueueBackend::reclaim_expired`] hands it out again.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    fn lock(&self) -> QueueResult<MutexGuard<'_, HashMap<String, QueueState>>> {
        self.queues
            .lock()
            .map_err(|_| QueueError::dequeue_failed("memory queue lock poisoned"))
    }

    /// Snapshot of a queue's dead letters.
    pub fn dead_letters(&self, queue: &str) -> Vec<DeadLetter> {
        self.lock()
            .ok()
            .and_then(|queues| queues.get(queue).map(|q| q.dead.clone()))
            .unwrap_or_default()
    }

    /// Deliveries currently held by consumers.
    pub fn in_flight(&self, queue: &str) -> usize {
        self.lock()
            .ok()
            .and_then(|queues| queues.get(queue).map(|q| q.in_flight.len()))
            .unwrap_or(0)
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    async fn publish(&self, queue: &str, body: &str, priority: u8) -> QueueResult<String> {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let id = format!("{}-{}", Utc::now().timestamp_millis(), seq);
        let delivery = Delivery {
            id: id.clone(),
            queue: queue.to_string(),
            body: body.to_string(),
            published_at: Utc::now(),
        };

        let mut queues = self.lock()?;
        let state = queues.entry(queue.to_string()).or_default();
        state.pending.push(Pending {
            priority: priority.min(MAX_PRIORITY),
            seq,
            delivery,
        });
        state.notify.notify_one();

        debug!(queue, id = %id, priority, "Published message");
        Ok(id)
    }

    async fn receive(&self, queue: &str, wait: Duration) -> QueueResult<Option<Delivery>> {
        let deadline = Instant::now() + wait;

        loop {
            let notify = {
                let mut queues = self.lock()?;
                let state = queues.entry(queue.to_string()).or_default();
                if let Some(next) = state.pending.pop() {
                    let delivery = next.delivery.clone();
                    state.in_flight.insert(
                        delivery.id.clone(),
                        Leased {
                            priority: next.priority,
                            seq: next.seq,
                            delivery: next.delivery,
                            deadline: Instant::now() + self.lease,
                        },
                    );
                    if !state.pending.is_empty() {
                        // Pass the wakeup on to another waiting consumer.
                        state.notify.notify_one();
                    }
                    return Ok(Some(delivery));
                }
                state.notify.clone()
            };

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            if tokio::time::timeout(deadline - now, notify.notified()).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut queues = self.lock()?;
        if let Some(state) = queues.get_mut(&delivery.queue) {
            state.in_flight.remove(&delivery.id);
        }
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> QueueResult<()> {
        let mut queues = self.lock()?;
        let state = queues.entry(delivery.queue.clone()).or_default();
        state.in_flight.remove(&delivery.id);
        state.dead.push(DeadLetter {
            queue: delivery.queue.clone(),
            body: delivery.body.clone(),
            reason: reason.to_string(),
            original_id: delivery.id.clone(),
            failed_at: Utc::now(),
        });
        Ok(())
    }

    async fn len(&self, queue: &str) -> QueueResult<u64> {
        Ok(self
            .lock()?
            .get(queue)
            .map(|q| q.pending.len() as u64)
            .unwrap_or(0))
    }

    async fn dlq_len(&self, queue: &str) -> QueueResult<u64> {
        Ok(self
            .lock()?
            .get(queue)
            .map(|q| q.dead.len() as u64)
            .unwrap_or(0))
    }

    async fn reclaim_expired(&self, queue: &str) -> QueueResult<u64> {
        let now = Instant::now();
        let mut queues = self.lock()?;
        let Some(state) = queues.get_mut(queue) else {
            return Ok(0);
        };

        let expired: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, leased)| leased.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(leased) = state.in_flight.remove(id) {
                let mut delivery = leased.delivery;
                delivery.published_at = Utc::now();
                state.pending.push(Pending {
                    priority: leased.priority,
                    seq: leased.seq,
                    delivery,
                });
                state.notify.notify_one();
            }
        }

        let reclaimed = expired.len() as u64;
        if reclaimed > 0 {
            info!(queue, reclaimed, "Reclaimed deliveries with expired leases");
        }
        Ok(reclaimed)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_priority_then_fifo() {
        let backend = MemoryBackend::new();
        backend.publish("q", "low", 1).await.unwrap();
        backend.publish("q", "high-1", 9).await.unwrap();
        backend.publish("q", "high-2", 9).await.unwrap();
        backend.publish("q", "clamped", 200).await.unwrap();

        let mut order = Vec::new();
        while let Some(d) = backend.receive("q", WAIT).await.unwrap() {
            order.push(d.body.clone());
            backend.ack(&d).await.unwrap();
        }
        assert_eq!(order, vec!["clamped", "high-1", "high-2", "low"]);
    }

    #[tokio::test]
    async fn test_receive_times_out_when_empty() {
        let backend = MemoryBackend::new();
        assert!(backend.receive("q", WAIT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_waiting_consumer_is_woken() {
        let backend = MemoryBackend::new();
        let consumer = backend.clone();
        let handle =
            tokio::spawn(async move { consumer.receive("q", Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        backend.publish("q", "wake", 5).await.unwrap();

        let delivery = handle.await.unwrap().unwrap().unwrap();
        assert_eq!(delivery.body, "wake");
        assert_eq!(backend.in_flight("q"), 1);
    }

    #[tokio::test]
    async fn test_reclaim_returns_expired_lease() {
        let backend = MemoryBackend::new().with_lease(Duration::from_millis(30));
        backend.publish("q", "crashed", 5).await.unwrap();
        backend.publish("q", "acked", 5).await.unwrap();

        let lost = backend.receive("q", WAIT).await.unwrap().unwrap();
        let done = backend.receive("q", WAIT).await.unwrap().unwrap();
        backend.ack(&done).await.unwrap();
        assert_eq!(backend.reclaim_expired("q").await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.reclaim_expired("q").await.unwrap(), 1);
        assert_eq!(backend.in_flight("q"), 0);
        assert_eq!(backend.len("q").await.unwrap(), 1);

        let again = backend.receive("q", WAIT).await.unwrap().unwrap();
        assert_eq!(again.id, lost.id);
        assert_eq!(again.body, "crashed");
        assert!(again.published_at > lost.published_at);
        assert_eq!(backend.reclaim_expired("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dead_letter_removes_from_flight() {
        let backend = MemoryBackend::new();
        backend.publish("q", "bad", 5).await.unwrap();
        let delivery = backend.receive("q", WAIT).await.unwrap().unwrap();

        backend.dead_letter(&delivery, "malformed").await.unwrap();

        assert_eq!(backend.in_flight("q"), 0);
        assert_eq!(backend.dlq_len("q").await.unwrap(), 1);
        let dead = backend.dead_letters("q");
        assert_eq!(dead[0].reason, "malformed");
        assert_eq!(dead[0].original_id, delivery.id);
    }
}
