//! Process-scoped handles shared by every worker task.

use std::sync::Arc;

use cstudio_compose::Compositor;
use cstudio_media::{FfmpegRunner, PlanCompiler, RenderExecutor};
use cstudio_models::JobId;
use cstudio_queue::{
    BackendKind, JobProgress, JobQueue, LocalProgressPublisher, ProgressPublisher, QueueConfig,
    RedisProgressPublisher,
};
use tracing::{info, warn};

use crate::catalog::{ClipCatalog, InMemoryCatalog, JsonFileCatalog};
use crate::config::{EncoderConfig, WorkerConfig};
use crate::error::WorkerResult;
use crate::sink::{LogRenderSink, RenderSink};

/// Everything a handler needs, passed explicitly instead of held in globals.
pub struct WorkerContext {
    pub config: WorkerConfig,
    pub queue: JobQueue,
    pub compositor: Compositor,
    pub compiler: PlanCompiler,
    pub executor: RenderExecutor,
    pub catalog: Arc<dyn ClipCatalog>,
    pub sink: Arc<dyn RenderSink>,
    pub progress: Arc<dyn ProgressPublisher>,
}

impl WorkerContext {
    /// Context with the default strategies, a log sink and in-process
    /// progress events.
    pub fn new(
        config: WorkerConfig,
        queue: JobQueue,
        encoder: &EncoderConfig,
        catalog: Arc<dyn ClipCatalog>,
    ) -> Self {
        Self {
            config,
            queue,
            compositor: Compositor::default(),
            compiler: PlanCompiler::new(),
            executor: RenderExecutor::new(encoder.runner()),
            catalog,
            sink: Arc::new(LogRenderSink),
            progress: Arc::new(LocalProgressPublisher::default()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn RenderSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressPublisher>) -> Self {
        self.progress = progress;
        self
    }

    /// Build from environment variables.
    pub async fn from_env(config: WorkerConfig) -> WorkerResult<Self> {
        let queue_config = QueueConfig::from_env()?;
        config.check_lease(queue_config.lease)?;
        let queue = JobQueue::connect(queue_config.clone()).await?;

        let catalog: Arc<dyn ClipCatalog> = match &config.catalog_path {
            Some(path) => Arc::new(JsonFileCatalog::load(path).await?),
            None => {
                warn!("CLIP_CATALOG_PATH not set, starting with an empty clip catalog");
                Arc::new(InMemoryCatalog::default())
            }
        };

        let progress: Arc<dyn ProgressPublisher> = match queue_config.backend {
            BackendKind::Redis => Arc::new(RedisProgressPublisher::new(&queue_config.redis_url)?),
            BackendKind::Memory => Arc::new(LocalProgressPublisher::default()),
        };

        let encoder = EncoderConfig::from_env();
        info!(encoder = %encoder.ffmpeg_path.display(), "Worker context ready");

        Ok(Self::new(config, queue, &encoder, catalog).with_progress(progress))
    }

    pub fn job_progress(&self, job_id: &JobId) -> JobProgress {
        JobProgress::new(Arc::clone(&self.progress), job_id.clone())
    }

    pub fn runner(&self) -> &FfmpegRunner {
        self.executor.runner()
    }
}
