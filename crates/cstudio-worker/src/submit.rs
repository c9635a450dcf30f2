//! Job submission with synchronous validation.
//!
//! Each `submit_*` call runs the same checks the worker will run, short of
//! spawning the encoder, so bad input is rejected to the caller instead of
//! being dead-lettered later.

use std::sync::Arc;

use cstudio_compose::{Compositor, TimelineAssembler};
use cstudio_media::PlanCompiler;
use cstudio_models::{JobId, JobKind, TransitionStyle};
use cstudio_queue::{CompositionPayload, Job, JobQueue, RenderPayload, ThumbnailPayload};
use tracing::{info, warn};

use crate::catalog::ClipCatalog;
use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::handlers::{resolve_clips, validate_offset, validate_segments};
use crate::metrics;

#[derive(Clone)]
pub struct Submitter {
    queue: JobQueue,
    catalog: Arc<dyn ClipCatalog>,
    compositor: Compositor,
    compiler: PlanCompiler,
}

impl Submitter {
    pub fn new(queue: JobQueue, catalog: Arc<dyn ClipCatalog>) -> Self {
        Self {
            queue,
            catalog,
            compositor: Compositor::default(),
            compiler: PlanCompiler::new(),
        }
    }

    /// Submitter sharing a worker's queue, catalog and strategies.
    pub fn from_context(ctx: &WorkerContext) -> Self {
        Self {
            queue: ctx.queue.clone(),
            catalog: Arc::clone(&ctx.catalog),
            compositor: ctx.compositor.clone(),
            compiler: ctx.compiler,
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Validate and enqueue a composition request.
    pub async fn submit_composition(
        &self,
        payload: CompositionPayload,
        priority: Option<u8>,
    ) -> WorkerResult<JobId> {
        let checked = self.check_composition(&payload).await;
        self.enqueue_checked(checked, Job::composition(payload), priority)
            .await
    }

    /// Validate and enqueue a render of already selected segments.
    pub async fn submit_render(
        &self,
        payload: RenderPayload,
        priority: Option<u8>,
    ) -> WorkerResult<JobId> {
        let checked = self.check_render(&payload).await;
        self.enqueue_checked(checked, Job::render(payload), priority)
            .await
    }

    /// Validate and enqueue a thumbnail extraction.
    pub async fn submit_thumbnail(
        &self,
        payload: ThumbnailPayload,
        priority: Option<u8>,
    ) -> WorkerResult<JobId> {
        let checked = self.check_thumbnail(&payload).await;
        self.enqueue_checked(checked, Job::thumbnail(payload), priority)
            .await
    }

    async fn check_composition(&self, payload: &CompositionPayload) -> WorkerResult<()> {
        if payload.project_id.trim().is_empty() {
            return Err(WorkerError::invalid_input("project_id is required"));
        }
        let candidates = self.catalog.find_clips(&payload.filter).await?;
        let composition =
            self.compositor
                .compose(&candidates, &payload.requirement, payload.strategy.as_deref())?;
        self.compiler
            .compile(&composition.timeline, &candidates, &payload.render_options)?;
        Ok(())
    }

    async fn check_render(&self, payload: &RenderPayload) -> WorkerResult<()> {
        if payload.project_id.trim().is_empty() {
            return Err(WorkerError::invalid_input("project_id is required"));
        }
        let clips = resolve_clips(self.catalog.as_ref(), &payload.segments).await?;
        validate_segments(&payload.segments, &clips)?;

        let mut segments = payload.segments.clone();
        let timeline = TimelineAssembler::new()
            .assemble(&mut segments, TransitionStyle::parse(&payload.transition_style));
        self.compiler
            .compile(&timeline, &clips, &payload.render_options)?;
        Ok(())
    }

    async fn check_thumbnail(&self, payload: &ThumbnailPayload) -> WorkerResult<()> {
        let clip = self
            .catalog
            .get_clip(payload.clip_id)
            .await?
            .ok_or_else(|| {
                WorkerError::invalid_input(format!("clip {} is not in the catalog", payload.clip_id))
            })?;
        validate_offset(&clip, payload.time_offset)
    }

    async fn enqueue_checked(
        &self,
        checked: WorkerResult<()>,
        job: Job,
        priority: Option<u8>,
    ) -> WorkerResult<JobId> {
        let kind: JobKind = job.kind();
        if let Err(e) = checked {
            metrics::record_submission_rejected(kind.as_str());
            warn!(job_type = kind.as_str(), "Rejected submission: {}", e);
            return Err(e);
        }

        let mut job = job.with_max_retry(self.queue.config().default_max_retry);
        if let Some(priority) = priority {
            job = job.with_priority(priority);
        }
        self.queue.enqueue(&job).await?;

        metrics::record_job_submitted(kind.as_str());
        info!(
            job_id = %job.id,
            job_type = kind.as_str(),
            priority = job.priority,
            "Submitted job"
        );
        Ok(job.id)
    }
}
