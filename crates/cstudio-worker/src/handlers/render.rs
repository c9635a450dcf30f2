//! `render_video`: render segments selected earlier.

use std::collections::HashMap;

use async_trait::async_trait;
use cstudio_compose::TimelineAssembler;
use cstudio_models::{Clip, ClipId, ClipSegment, JobKind, JobState, TransitionStyle};
use cstudio_queue::{Job, JobPayload};
use tokio_util::sync::CancellationToken;

use super::{render_timeline, JobHandler, RenderRequest};
use crate::catalog::ClipCatalog;
use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::sink::RenderRecord;

/// Slack allowed when a segment ends at the clip boundary.
const BOUNDARY_EPSILON: f64 = 1e-3;

pub struct RenderHandler;

/// Look up every clip the segments reference, in first-use order.
pub(crate) async fn resolve_clips(
    catalog: &dyn ClipCatalog,
    segments: &[ClipSegment],
) -> WorkerResult<Vec<Clip>> {
    let mut clips: Vec<Clip> = Vec::new();
    for segment in segments {
        if clips.iter().any(|c| c.id == segment.clip_id) {
            continue;
        }
        let clip = catalog.get_clip(segment.clip_id).await?.ok_or_else(|| {
            WorkerError::invalid_input(format!("clip {} is not in the catalog", segment.clip_id))
        })?;
        clips.push(clip);
    }
    Ok(clips)
}

/// Segments must be non-empty and lie inside their source clips.
pub fn validate_segments(segments: &[ClipSegment], clips: &[Clip]) -> WorkerResult<()> {
    if segments.is_empty() {
        return Err(WorkerError::invalid_input("render request has no segments"));
    }
    let by_id: HashMap<ClipId, &Clip> = clips.iter().map(|c| (c.id, c)).collect();

    for (i, segment) in segments.iter().enumerate() {
        let clip = by_id.get(&segment.clip_id).ok_or_else(|| {
            WorkerError::invalid_input(format!("clip {} is not in the catalog", segment.clip_id))
        })?;
        let valid = segment.start_time.is_finite()
            && segment.end_time.is_finite()
            && segment.start_time >= 0.0
            && segment.end_time > segment.start_time
            && segment.end_time <= clip.duration + BOUNDARY_EPSILON;
        if !valid {
            return Err(WorkerError::invalid_input(format!(
                "segment {} [{:.3}, {:.3}] does not fit clip {} ({:.3}s)",
                i, segment.start_time, segment.end_time, clip.id, clip.duration
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl JobHandler for RenderHandler {
    fn kind(&self) -> JobKind {
        JobKind::RenderVideo
    }

    async fn handle(
        &self,
        ctx: &WorkerContext,
        job: &Job,
        cancel: CancellationToken,
    ) -> WorkerResult<()> {
        let JobPayload::Render(payload) = &job.payload else {
            return Err(WorkerError::invalid_input("expected a render_video payload"));
        };
        let progress = ctx.job_progress(&job.id);

        let clips = resolve_clips(ctx.catalog.as_ref(), &payload.segments).await?;
        validate_segments(&payload.segments, &clips)?;

        let mut segments = payload.segments.clone();
        let timeline = TimelineAssembler::new()
            .assemble(&mut segments, TransitionStyle::parse(&payload.transition_style));

        let rendered = render_timeline(
            ctx,
            job,
            &progress,
            RenderRequest {
                timeline: &timeline,
                clips: &clips,
                options: &payload.render_options,
                stem: &payload.task_id,
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
