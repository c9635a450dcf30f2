//! Job executor: one supervised task per queue, each running a fixed
//! number of receive-process-acknowledge loops.
//!
//! A worker holds at most one unacknowledged job, so a queue never has more
//! jobs in flight than its configured concurrency.

use std::sync::Arc;
use std::time::Duration;

use cstudio_models::{JobKind, JobState};
use cstudio_queue::{FailureOutcome, JobPayload, JobQueue, QueueError, ReceivedJob};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::handlers::{HandlerRegistry, JobHandler};
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{Backoff, ErrorStreak};
use crate::sink::RenderRecord;

/// Pause after a failed receive before trying again.
const RECEIVE_BACKOFF: Duration = Duration::from_secs(1);

/// Time given to cancelled jobs to hand their deliveries back.
const ABORT_GRACE: Duration = Duration::from_secs(5);

/// Job executor that processes jobs from every registered queue.
pub struct JobExecutor {
    ctx: Arc<WorkerContext>,
    handlers: HandlerRegistry,
    /// Stops receiving new jobs
    shutdown: CancellationToken,
    /// Cancels jobs still running after the shutdown timeout
    abort: CancellationToken,
}

impl JobExecutor {
    pub fn new(ctx: WorkerContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            handlers: HandlerRegistry::default(),
            shutdown: CancellationToken::new(),
            abort: CancellationToken::new(),
        }
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    /// Token that stops the executor when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Start the executor and block until shutdown completes.
    ///
    /// After shutdown is signalled, running jobs get `shutdown_timeout` to
    /// finish. Jobs still running after that are cancelled and returned to
    /// their queue with their retry count unchanged.
    pub async fn run(&self) -> WorkerResult<()> {
        let config = &self.ctx.config;
        tokio::fs::create_dir_all(config.renders_dir()).await?;
        tokio::fs::create_dir_all(config.thumbnails_dir()).await?;

        let mut queues = JoinSet::new();
        for kind in self.handlers.kinds() {
            let workers = config.concurrency_for(kind);
            let Some(handler) = self.handlers.get(kind) else {
                continue;
            };
            if workers == 0 {
                info!(queue = kind.queue_name(), "Queue disabled (concurrency 0)");
                continue;
            }
            queues.spawn(run_queue(
                Arc::clone(&self.ctx),
                handler,
                workers,
                self.shutdown.clone(),
                self.abort.clone(),
            ));
        }

        if queues.is_empty() {
            return Err(WorkerError::config_error("no queue has any workers configured"));
        }

        info!(
            backend = self.ctx.queue.backend().name(),
            queues = queues.len(),
            "Job executor started"
        );

        self.shutdown.cancelled().await;
        info!("Shutdown signal received, stopping executor");

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(config.shutdown_timeout, join_all(&mut queues))
            .await
            .is_err()
        {
            warn!(
                timeout_secs = config.shutdown_timeout.as_secs(),
                "Shutdown timeout reached, cancelling in-flight jobs"
            );
            self.abort.cancel();
            if tokio::time::timeout(ABORT_GRACE, join_all(&mut queues))
                .await
                .is_err()
            {
                error!("Jobs did not stop after cancellation, aborting tasks");
                queues.abort_all();
            }
        }

        info!("Job executor stopped");
        Ok(())
    }
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!("Queue task failed: {}", e);
        }
    }
}

/// Supervise the workers of one queue. A worker that panics is replaced
/// until shutdown.
async fn run_queue(
    ctx: Arc<WorkerContext>,
    handler: Arc<dyn JobHandler>,
    workers: usize,
    shutdown: CancellationToken,
    abort: CancellationToken,
) {
    let kind = handler.kind();
    let queue = kind.queue_name();
    info!(queue, workers, "Starting queue workers");

    let reclaim = tokio::spawn(reclaim_loop(
        ctx.queue.clone(),
        kind,
        ctx.config.reclaim_interval,
        shutdown.clone(),
    ));

    let spawn_worker = |tasks: &mut JoinSet<()>, worker_id: usize| {
        tasks.spawn(worker_loop(
            Arc::clone(&ctx),
            Arc::clone(&handler),
            worker_id,
            shutdown.clone(),
            abort.clone(),
        ));
    };

    let mut tasks = JoinSet::new();
    for worker_id in 0..workers {
        spawn_worker(&mut tasks, worker_id);
    }

    let mut next_id = workers;
    while let Some(result) = tasks.join_next().await {
        match result {
            Err(e) if e.is_panic() && !shutdown.is_cancelled() => {
                error!(queue, "Worker panicked, restarting: {}", e);
                spawn_worker(&mut tasks, next_id);
                next_id += 1;
            }
            Err(e) => error!(queue, "Worker task failed: {}", e),
            Ok(()) => {}
        }
    }

    let _ = reclaim.await;
    info!(queue, "Queue workers stopped");
}

async fn worker_loop(
    ctx: Arc<WorkerContext>,
    handler: Arc<dyn JobHandler>,
    worker_id: usize,
    shutdown: CancellationToken,
    abort: CancellationToken,
) {
    let kind = handler.kind();
    let queue = kind.queue_name();
    let mut errors = ErrorStreak::new(3);

    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            result = ctx.queue.receive(kind, ctx.config.receive_wait) => result,
        };

        match received {
            Ok(Some(received)) => {
                errors.recovered();
                process_job(&ctx, handler.as_ref(), received, &abort).await;
            }
            Ok(None) => errors.recovered(),
            Err(e) => {
                if errors.failed() {
                    error!(queue, worker_id, "Error receiving jobs: {}", e);
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RECEIVE_BACKOFF) => {}
                }
            }
        }
    }

    debug!(queue, worker_id, "Worker stopped");
}

/// Periodically return deliveries abandoned by crashed workers.
async fn reclaim_loop(queue: JobQueue, kind: JobKind, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(100)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = queue.reclaim_expired(kind).await {
                    warn!(queue = kind.queue_name(), "Failed to reclaim expired deliveries: {}", e);
                }
            }
        }
    }
}

fn project_id(payload: &JobPayload) -> Option<&str> {
    match payload {
        JobPayload::Composition(p) => Some(&p.project_id),
        JobPayload::Render(p) => Some(&p.project_id),
        JobPayload::Thumbnail(_) => None,
    }
}

/// Execute a single job with retry and DLQ handling.
async fn process_job(
    ctx: &WorkerContext,
    handler: &dyn JobHandler,
    received: ReceivedJob,
    abort: &CancellationToken,
) {
    let job = &received.job;
    let kind = job.kind();
    let logger = JobLogger::new(job);
    let progress = ctx.job_progress(&job.id);
    let queue = &ctx.queue;

    async {
        metrics::record_job_received(kind.as_str());
        logger.log_start();
        progress.status(JobState::Processing).await;

        let result = handler.handle(ctx, job, abort.child_token()).await;

        match result {
            Ok(()) => {
                let acked = Backoff::new("ack")
                    .run(QueueError::is_transient, || queue.ack(&received))
                    .await;
                if let Err(e) = acked {
                    // The lease expires and the job runs again.
                    logger.log_error(&format!("failed to acknowledge: {}", e));
                }
                metrics::record_job_completed(kind.as_str());
                progress.status(JobState::Completed).await;
                logger.log_completion();
            }
            Err(e) if e.is_cancelled() => {
                logger.log_warning("cancelled, returning job to queue");
                if let Err(e) = queue.release(&received).await {
                    logger.log_error(&format!("failed to release: {}", e));
                }
                progress.status(JobState::Pending).await;
            }
            Err(e) => {
                let message = e.to_string();
                logger.log_error(&message);

                // Not retried here: a republish that succeeded before a
                // failed ack would otherwise be published twice.
                match queue.fail(&received, &message, e.is_retryable()).await {
                    Ok(FailureOutcome::Retried { retry }) => {
                        logger.log_progress(&format!("Scheduled retry {}", retry));
                        metrics::record_job_retried(kind.as_str());
                        progress.status(JobState::Failed).await;
                        progress
                            .log(format!("Attempt failed, retrying ({}/{}): {}", retry, job.max_retry, message))
                            .await;
                    }
                    Ok(FailureOutcome::DeadLettered { reason }) => {
                        metrics::record_job_dead_lettered(kind.as_str());
                        progress.status(JobState::DeadLettered).await;
                        progress.error(reason.clone()).await;
                        if let Some(project) = project_id(&job.payload) {
                            ctx.sink
                                .record(RenderRecord::failed(job.id.clone(), project, reason))
                                .await;
                        }
                    }
                    Err(qe) => {
                        logger.log_error(&format!("failed to record failure: {}", qe));
                    }
                }
            }
        }
    }
    .instrument(logger.span())
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::config::{EncoderConfig, WorkerConfig};
    use async_trait::async_trait;
    use cstudio_models::ClipId;
    use cstudio_queue::{Job, MemoryBackend, QueueConfig, ThumbnailPayload};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Semaphore;

    /// Fails the first `failures` calls with a retryable error.
    struct FlakyHandler {
        calls: Arc<AtomicU32>,
        failures: u32,
    }

    #[async_trait]
    impl JobHandler for FlakyHandler {
        fn kind(&self) -> JobKind {
            JobKind::GenerateThumbnail
        }

        async fn handle(&self, _: &WorkerContext, _: &Job, _: CancellationToken) -> WorkerResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(WorkerError::job_failed("encoder crashed"))
            } else {
                Ok(())
            }
        }
    }

    /// Runs until cancelled.
    struct StuckHandler;

    #[async_trait]
    impl JobHandler for StuckHandler {
        fn kind(&self) -> JobKind {
            JobKind::GenerateThumbnail
        }

        async fn handle(&self, _: &WorkerContext, _: &Job, cancel: CancellationToken) -> WorkerResult<()> {
            cancel.cancelled().await;
            Err(WorkerError::Cancelled)
        }
    }

    /// Blocks each call until a permit is released.
    struct GatedHandler {
        started: Arc<AtomicU32>,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl JobHandler for GatedHandler {
        fn kind(&self) -> JobKind {
            JobKind::GenerateThumbnail
        }

        async fn handle(&self, _: &WorkerContext, _: &Job, _: CancellationToken) -> WorkerResult<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.map_err(|_| WorkerError::Cancelled)?;
            Ok(())
        }
    }

    fn executor(handler: Arc<dyn JobHandler>, work_dir: &std::path::Path) -> JobExecutor {
        let config = WorkerConfig {
            work_dir: work_dir.to_path_buf(),
            receive_wait: Duration::from_millis(20),
            shutdown_timeout: Duration::from_millis(200),
            ..WorkerConfig::default()
        };
        let ctx = WorkerContext::new(
            config,
            JobQueue::memory(),
            &EncoderConfig::default(),
            Arc::new(InMemoryCatalog::default()),
        );
        let mut handlers = HandlerRegistry::new();
        handlers.register(handler);
        JobExecutor::new(ctx).with_handlers(handlers)
    }

    fn thumbnail_job(max_retry: u32) -> Job {
        Job::thumbnail(ThumbnailPayload {
            clip_id: ClipId(1),
            time_offset: 0.0,
        })
        .with_max_retry(max_retry)
    }

    async fn wait_for(calls: &AtomicU32, expected: u32) {
        for _ in 0..200 {
            if calls.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("handler called {} times, expected {}", calls.load(Ordering::SeqCst), expected);
    }

    #[tokio::test]
    async fn test_fails_twice_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let executor = Arc::new(executor(
            Arc::new(FlakyHandler { calls: calls.clone(), failures: 2 }),
            dir.path(),
        ));
        let queue = executor.context().queue.clone();
        queue.enqueue(&thumbnail_job(3)).await.unwrap();

        let running = tokio::spawn({
            let executor = executor.clone();
            async move { executor.run().await }
        });
        wait_for(&calls, 3).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        executor.shutdown();
        running.await.unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(queue.len(JobKind::GenerateThumbnail).await.unwrap(), 0);
        assert_eq!(queue.dlq_len(JobKind::GenerateThumbnail).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dead_letters_after_max_retry() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let executor = Arc::new(executor(
            Arc::new(FlakyHandler { calls: calls.clone(), failures: u32::MAX }),
            dir.path(),
        ));
        let queue = executor.context().queue.clone();
        queue.enqueue(&thumbnail_job(3)).await.unwrap();

        let running = tokio::spawn({
            let executor = executor.clone();
            async move { executor.run().await }
        });
        wait_for(&calls, 3).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        executor.shutdown();
        running.await.unwrap().unwrap();

        // Never delivered again once dead-lettered.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(queue.dlq_len(JobKind::GenerateThumbnail).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_returns_stuck_job_to_queue() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(executor(Arc::new(StuckHandler), dir.path()));
        let queue = executor.context().queue.clone();
        let job = thumbnail_job(3);
        queue.enqueue(&job).await.unwrap();

        let running = tokio::spawn({
            let executor = executor.clone();
            async move { executor.run().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        executor.shutdown();
        running.await.unwrap().unwrap();

        let back = queue
            .receive(JobKind::GenerateThumbnail, Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(back.job.id, job.id);
        assert_eq!(back.job.retry, 0);
    }

    #[tokio::test]
    async fn test_in_flight_bounded_by_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let queue = JobQueue::new(Arc::new(backend.clone()), QueueConfig::memory());
        let config = WorkerConfig {
            thumbnail_concurrency: 2,
            work_dir: dir.path().to_path_buf(),
            receive_wait: Duration::from_millis(20),
            shutdown_timeout: Duration::from_secs(2),
            ..WorkerConfig::default()
        };
        let ctx = WorkerContext::new(
            config,
            queue.clone(),
            &EncoderConfig::default(),
            Arc::new(InMemoryCatalog::default()),
        );
        let started = Arc::new(AtomicU32::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let mut handlers = HandlerRegistry::new();
        handlers.register(Arc::new(GatedHandler {
            started: started.clone(),
            gate: gate.clone(),
        }));
        let executor = Arc::new(JobExecutor::new(ctx).with_handlers(handlers));

        for _ in 0..5 {
            queue.enqueue(&thumbnail_job(3)).await.unwrap();
        }
        let running = tokio::spawn({
            let executor = executor.clone();
            async move { executor.run().await }
        });

        wait_for(&started, 2).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(backend.in_flight("thumbnail_generation"), 2);
        assert_eq!(queue.len(JobKind::GenerateThumbnail).await.unwrap(), 3);

        gate.add_permits(5);
        wait_for(&started, 5).await;
        for _ in 0..200 {
            if backend.in_flight("thumbnail_generation") == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        executor.shutdown();
        running.await.unwrap().unwrap();

        assert_eq!(backend.in_flight("thumbnail_generation"), 0);
        assert_eq!(queue.len(JobKind::GenerateThumbnail).await.unwrap(), 0);
        assert_eq!(queue.dlq_len(JobKind::GenerateThumbnail).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_no_enabled_queue_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor(Arc::new(StuckHandler), dir.path());
        let executor = JobExecutor {
            handlers: HandlerRegistry::new(),
            ..executor
        };
        assert!(matches!(executor.run().await, Err(WorkerError::ConfigError(_))));
    }
}
