//! `smart_composition`: select clips, assemble, render.

use std::time::Instant;

use async_trait::async_trait;
use cstudio_models::{JobKind, JobState};
use cstudio_queue::{Job, JobPayload};
use tokio_util::sync::CancellationToken;

use super::{render_timeline, JobHandler, RenderRequest};
use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::sink::RenderRecord;

pub struct CompositionHandler;

#[async_trait]
impl JobHandler for CompositionHandler {
    fn kind(&self) -> JobKind {
        JobKind::SmartComposition
    }

    async fn handle(
        &self,
        ctx: &WorkerContext,
        job: &Job,
        cancel: CancellationToken,
    ) -> WorkerResult<()> {
        let JobPayload::Composition(payload) = &job.payload else {
            return Err(WorkerError::invalid_input("expected a smart_composition payload"));
        };
        let progress = ctx.job_progress(&job.id);

        let candidates = ctx.catalog.find_clips(&payload.filter).await?;
        progress
            .log(format!("Selecting from {} candidate clips", candidates.len()))
            .await;

        let started = Instant::now();
        let composition =
            ctx.compositor
                .compose(&candidates, &payload.requirement, payload.strategy.as_deref())?;
        metrics::record_selection_duration(
            &composition.metadata.strategy,
            started.elapsed().as_secs_f64(),
        );
        progress
            .log(format!(
                "Selected {} clips with {} ({:.1}s, quality {:.2}, cohesion {:.2})",
                composition.metadata.clip_count,
                composition.metadata.strategy,
                composition.total_duration,
                composition.quality_score,
                composition.cohesion_score
            ))
            .await;

        let stem = payload
            .output_name
            .clone()
            .unwrap_or_else(|| job.id.to_string());
        let rendered = render_timeline(
            ctx,
            job,
            &progress,
            RenderRequest {
                timeline: &composition.timeline,
                clips: &candidates,
                options: &payload.render_options,
                stem: &stem,
            },
            cancel,
        )
        .await?;

        ctx.sink
            .record(RenderRecord {
                job_id: job.id.clone(),
                project_id: payload.project_id.clone(),
                output_path: Some(rendered.path.clone()),
                file_size: rendered.file_size,
                duration: rendered.duration,
                status: JobState::Completed,
                error: None,
            })
            .await;
        progress.done(rendered.path.display().to_string()).await;
        Ok(())
    }
}
