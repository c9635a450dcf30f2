//! Progress events via Redis Pub/Sub or an in-process broadcast channel.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use cstudio_models::{JobId, JobState, RenderProgress};

use crate::error::QueueResult;

/// What a progress event reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressMessage {
    Status { state: JobState },
    Progress { progress: RenderProgress },
    Log { message: String },
    /// Finished; `output` is the produced file
    Done { output: String },
    Error { message: String },
}

/// Progress event published for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub message: ProgressMessage,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(job_id: JobId, message: ProgressMessage) -> Self {
        Self {
            job_id,
            message,
            timestamp: Utc::now(),
        }
    }
}

/// Destination for progress events.
#[async_trait]
pub trait ProgressPublisher: Send + Sync {
    async fn publish(&self, event: &ProgressEvent) -> QueueResult<()>;
}

/// Publishes to `progress:<job_id>` over Redis Pub/Sub.
pub struct RedisProgressPublisher {
    client: redis::Client,
}

impl RedisProgressPublisher {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Get the channel name for a job.
    pub fn channel_name(job_id: &JobId) -> String {
        format!("progress:{}", job_id)
    }

    /// Subscribe to progress events for a job.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> QueueResult<Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>> {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(Self::channel_name(job_id)).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl ProgressPublisher for RedisProgressPublisher {
    async fn publish(&self, event: &ProgressEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&event.job_id);
        let payload = serde_json::to_string(event)?;

        debug!("Publishing progress event to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }
}

/// Broadcasts events to in-process subscribers. Events published while
/// nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct LocalProgressPublisher {
    sender: broadcast::Sender<ProgressEvent>,
}

impl LocalProgressPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for LocalProgressPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl ProgressPublisher for LocalProgressPublisher {
    async fn publish(&self, event: &ProgressEvent) -> QueueResult<()> {
        // Err only means there are no subscribers.
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}

/// Progress reporting for one job. Publication failures are logged and
/// never fail the job.
#[derive(Clone)]
pub struct JobProgress {
    publisher: Arc<dyn ProgressPublisher>,
    job_id: JobId,
}

impl JobProgress {
    pub fn new(publisher: Arc<dyn ProgressPublisher>, job_id: JobId) -> Self {
        Self { publisher, job_id }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    async fn send(&self, message: ProgressMessage) {
        let event = ProgressEvent::new(self.job_id.clone(), message);
        if let Err(e) = self.publisher.publish(&event).await {
            warn!(job_id = %self.job_id, "Failed to publish progress: {}", e);
        }
    }

    pub async fn status(&self, state: JobState) {
        self.send(ProgressMessage::Status { state }).await
    }

    pub async fn progress(&self, progress: RenderProgress) {
        self.send(ProgressMessage::Progress { progress }).await
    }

    pub async fn log(&self, message: impl Into<String>) {
        self.send(ProgressMessage::Log {
            message: message.into(),
        })
        .await
    }

    pub async fn done(&self, output: impl Into<String>) {
        self.send(ProgressMessage::Done {
            output: output.into(),
        })
        .await
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.send(ProgressMessage::Error {
            message: message.into(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name() {
        assert_eq!(
            RedisProgressPublisher::channel_name(&JobId::from_string("abc")),
            "progress:abc"
        );
    }

    #[test]
    fn test_message_wire_shape() {
        let event = ProgressEvent::new(
            JobId::from_string("j1"),
            ProgressMessage::Status {
                state: JobState::DeadLettered,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["message"]["type"], "status");
        assert_eq!(json["message"]["state"], "dead_lettered");
    }

    #[tokio::test]
    async fn test_local_publisher_delivers_in_order() {
        let local = LocalProgressPublisher::default();
        let mut rx = local.subscribe();
        let progress = JobProgress::new(Arc::new(local.clone()), JobId::from_string("j1"));

        progress.status(JobState::Processing).await;
        progress.log("selecting clips").await;
        progress.done("/renders/j1.mp4").await;

        let mut kinds = Vec::new();
        for _ in 0..3 {
            kinds.push(rx.recv().await.unwrap().message);
        }
        assert_eq!(
            kinds,
            vec![
                ProgressMessage::Status { state: JobState::Processing },
                ProgressMessage::Log { message: "selecting clips".into() },
                ProgressMessage::Done { output: "/renders/j1.mp4".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let local = LocalProgressPublisher::new(4);
        let event = ProgressEvent::new(JobId::new(), ProgressMessage::Log { message: "x".into() });
        assert!(local.publish(&event).await.is_ok());
    }
}
