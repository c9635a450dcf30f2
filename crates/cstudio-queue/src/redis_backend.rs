//! Redis queue backend.
//!
//! Key layout per queue (`{prefix}:{queue}:...`):
//! - `pending`: ZSET of message ids, scored so that higher priority sorts
//!   first and equal priorities keep publish order
//! - `inflight`: ZSET of delivered ids scored by lease deadline (ms)
//! - `bodies` / `scores`: HASHes holding the stored message and its pending score
//! - `dlq`: STREAM of dead letters (`job`, `error`, `original_id`)
//!
//! Delivery moves an id from `pending` to `inflight` atomically. A crashed
//! consumer's deliveries go back to `pending` once their lease expires and
//! [`QueueBackend::reclaim_expired`] runs; their `published_at` is reset to
//! the reclaim time.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{Delivery, QueueBackend};
use crate::error::{QueueError, QueueResult};
use crate::job::MAX_PRIORITY;

/// Width of the timestamp component of a pending score.
const PRIORITY_BAND: f64 = 1e13;

const POP_SCRIPT: &str = r#"
local ids = redis.call('ZRANGE', KEYS[1], 0, 0)
if #ids == 0 then
    return false
end
local id = ids[1]
redis.call('ZREM', KEYS[1], id)
local record = redis.call('HGET', KEYS[3], id)
if not record then
    redis.call('HDEL', KEYS[4], id)
    return false
end
redis.call('ZADD', KEYS[2], ARGV[1], id)
return {id, record}
"#;

// Reclaimed records are restamped with ARGV[2] so the message TTL counts
// from the moment they became deliverable again.
const RECLAIM_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, id in ipairs(ids) do
    redis.call('ZREM', KEYS[1], id)
    local score = redis.call('HGET', KEYS[3], id)
    if score then
        local record = redis.call('HGET', KEYS[4], id)
        if record then
            local ok, stored = pcall(cjson.decode, record)
            if ok and type(stored) == 'table' then
                stored['published_at'] = ARGV[2]
                redis.call('HSET', KEYS[4], id, cjson.encode(stored))
            end
        end
        redis.call('ZADD', KEYS[2], score, id)
    end
end
return #ids
"#;

#[derive(Debug, Serialize, Deserialize)]
struct StoredMessage {
    body: String,
    published_at: DateTime<Utc>,
}

/// Pending score: priority band first, publish time within the band.
fn pending_score(priority: u8, published_at: DateTime<Utc>) -> f64 {
    let band = (MAX_PRIORITY - priority.min(MAX_PRIORITY)) as f64;
    band * PRIORITY_BAND + published_at.timestamp_millis() as f64
}

#[derive(Debug, Clone)]
struct QueueKeys {
    pending: String,
    inflight: String,
    bodies: String,
    scores: String,
    dlq: String,
}

impl QueueKeys {
    fn new(prefix: &str, queue: &str) -> Self {
        let base = format!("{}:{}", prefix, queue);
        Self {
            pending: format!("{}:pending", base),
            inflight: format!("{}:inflight", base),
            bodies: format!("{}:bodies", base),
            scores: format!("{}:scores", base),
            dlq: format!("{}:dlq", base),
        }
    }
}

/// Queue transport over a single shared multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisBackend {
    conn: MultiplexedConnection,
    prefix: String,
    lease: Duration,
    poll_interval: Duration,
    pop: Script,
    reclaim: Script,
}

impl RedisBackend {
    /// Connect to `redis_url`.
    pub async fn connect(
        redis_url: &str,
        prefix: impl Into<String>,
        lease: Duration,
        poll_interval: Duration,
    ) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::connection_failed(format!("invalid Redis URL: {}", e)))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;

        let prefix = prefix.into();
        info!(prefix = %prefix, lease_secs = lease.as_secs(), "Connected to Redis queue");

        Ok(Self {
            conn,
            prefix,
            lease,
            poll_interval: poll_interval.max(Duration::from_millis(10)),
            pop: Script::new(POP_SCRIPT),
            reclaim: Script::new(RECLAIM_SCRIPT),
        })
    }

    fn keys(&self, queue: &str) -> QueueKeys {
        QueueKeys::new(&self.prefix, queue)
    }

    async fn try_pop(&self, queue: &str) -> QueueResult<Option<Delivery>> {
        let keys = self.keys(queue);
        let mut conn = self.conn.clone();
        let lease_deadline = Utc::now().timestamp_millis() + self.lease.as_millis() as i64;

        let popped: Option<(String, String)> = self
            .pop
            .key(&keys.pending)
            .key(&keys.inflight)
            .key(&keys.bodies)
            .key(&keys.scores)
            .arg(lease_deadline)
            .invoke_async(&mut conn)
            .await?;

        let Some((id, record)) = popped else {
            return Ok(None);
        };

        match serde_json::from_str::<StoredMessage>(&record) {
            Ok(stored) => Ok(Some(Delivery {
                id,
                queue: queue.to_string(),
                body: stored.body,
                published_at: stored.published_at,
            })),
            Err(e) => {
                // Deliver the raw record so the queue layer dead-letters it.
                warn!(queue, id = %id, "Stored message is not a queue record: {}", e);
                Ok(Some(Delivery {
                    id,
                    queue: queue.to_string(),
                    body: record,
                    published_at: Utc::now(),
                }))
            }
        }
    }
}

#[async_trait]
impl QueueBackend for RedisBackend {
    async fn publish(&self, queue: &str, body: &str, priority: u8) -> QueueResult<String> {
        let keys = self.keys(queue);
        let mut conn = self.conn.clone();

        let id = Uuid::new_v4().to_string();
        let published_at = Utc::now();
        let score = pending_score(priority, published_at);
        let record = serde_json::to_string(&StoredMessage {
            body: body.to_string(),
            published_at,
        })?;

        let _: () = redis::pipe()
            .atomic()
            .hset(&keys.bodies, &id, &record)
            .ignore()
            .hset(&keys.scores, &id, score)
            .ignore()
            .zadd(&keys.pending, &id, score)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        debug!(queue, id = %id, priority, "Published message");
        Ok(id)
    }

    async fn receive(&self, queue: &str, wait: Duration) -> QueueResult<Option<Delivery>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_pop(queue).await? {
                return Ok(Some(delivery));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let keys = self.keys(&delivery.queue);
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .zrem(&keys.inflight, &delivery.id)
            .ignore()
            .hdel(&keys.bodies, &delivery.id)
            .ignore()
            .hdel(&keys.scores, &delivery.id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(queue = %delivery.queue, id = %delivery.id, "Acknowledged message");
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> QueueResult<()> {
        let keys = self.keys(&delivery.queue);
        let mut conn = self.conn.clone();

        redis::cmd("XADD")
            .arg(&keys.dlq)
            .arg("*")
            .arg("job")
            .arg(&delivery.body)
            .arg("error")
            .arg(reason)
            .arg("original_id")
            .arg(&delivery.id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(delivery).await?;

        warn!(queue = %delivery.queue, id = %delivery.id, "Moved message to DLQ: {}", reason);
        Ok(())
    }

    async fn len(&self, queue: &str) -> QueueResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.zcard(self.keys(queue).pending).await?;
        Ok(len)
    }

    async fn dlq_len(&self, queue: &str) -> QueueResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.xlen(self.keys(queue).dlq).await?;
        Ok(len)
    }

    async fn reclaim_expired(&self, queue: &str) -> QueueResult<u64> {
        let keys = self.keys(queue);
        let mut conn = self.conn.clone();
        let now = Utc::now();

        let reclaimed: u64 = self
            .reclaim
            .key(&keys.inflight)
            .key(&keys.pending)
            .key(&keys.scores)
            .key(&keys.bodies)
            .arg(now.timestamp_millis())
            .arg(now.to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        if reclaimed > 0 {
            info!(queue, reclaimed, "Reclaimed deliveries with expired leases");
        }
        Ok(reclaimed)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_pending_score_orders_priority_before_time() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();

        assert!(pending_score(9, late) < pending_score(8, early));
        assert!(pending_score(5, early) < pending_score(5, late));
        assert_eq!(pending_score(50, early), pending_score(10, early));
    }

    #[test]
    fn test_key_layout() {
        let keys = QueueKeys::new("cstudio", "render_tasks");
        assert_eq!(keys.pending, "cstudio:render_tasks:pending");
        assert_eq!(keys.dlq, "cstudio:render_tasks:dlq");
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_round_trip_against_redis() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        let prefix = format!("cstudio-test-{}", Uuid::new_v4());
        let backend = RedisBackend::connect(&url, prefix, Duration::ZERO, Duration::from_millis(20))
            .await
            .unwrap();

        backend.publish("q", "low", 1).await.unwrap();
        backend.publish("q", "high", 9).await.unwrap();
        assert_eq!(backend.len("q").await.unwrap(), 2);

        let first = backend.receive("q", Duration::from_millis(200)).await.unwrap().unwrap();
        assert_eq!(first.body, "high");

        // Zero lease: the delivery is immediately reclaimable.
        assert_eq!(backend.reclaim_expired("q").await.unwrap(), 1);
        let again = backend.receive("q", Duration::from_millis(200)).await.unwrap().unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.body, "high");
        assert!(again.published_at > first.published_at);

        backend.dead_letter(&again, "boom").await.unwrap();
        assert_eq!(backend.dlq_len("q").await.unwrap(), 1);

        let rest = backend.receive("q", Duration::from_millis(200)).await.unwrap().unwrap();
        backend.ack(&rest).await.unwrap();
        assert_eq!(backend.len("q").await.unwrap(), 0);
    }
}
