//! `generate_thumbnail`: extract one frame from a clip.

use async_trait::async_trait;
use cstudio_media::generate_thumbnail;
use cstudio_models::{Clip, JobKind};
use cstudio_queue::{Job, JobPayload};
use tokio_util::sync::CancellationToken;

use super::JobHandler;
use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};

pub struct ThumbnailHandler;

/// The offset must fall inside the clip.
pub fn validate_offset(clip: &Clip, time_offset: f64) -> WorkerResult<()> {
    if !time_offset.is_finite() || time_offset < 0.0 || time_offset > clip.duration {
        return Err(WorkerError::invalid_input(format!(
            "thumbnail offset {} is outside clip {} ({:.3}s)",
            time_offset, clip.id, clip.duration
        )));
    }
    Ok(())
}

#[async_trait]
impl JobHandler for ThumbnailHandler {
    fn kind(&self) -> JobKind {
        JobKind::GenerateThumbnail
    }

    async fn handle(
        &self,
        ctx: &WorkerContext,
        job: &Job,
        cancel: CancellationToken,
    ) -> WorkerResult<()> {
        let JobPayload::Thumbnail(payload) = &job.payload else {
            return Err(WorkerError::invalid_input("expected a generate_thumbnail payload"));
        };
        let progress = ctx.job_progress(&job.id);

        let clip = ctx
            .catalog
            .get_clip(payload.clip_id)
            .await?
            .ok_or_else(|| {
                WorkerError::invalid_input(format!("clip {} is not in the catalog", payload.clip_id))
            })?;
        validate_offset(&clip, payload.time_offset)?;
        if !tokio::fs::try_exists(&clip.file_path).await.unwrap_or(false) {
            return Err(WorkerError::invalid_input(format!(
                "source for clip {} is missing: {}",
                clip.id,
                clip.file_path.display()
            )));
        }

        let output = ctx
            .config
            .thumbnails_dir()
            .join(format!("{}_{}.jpg", clip.id, job.id));
        let runner = ctx
            .runner()
            .clone()
            .with_cancel(cancel)
            .with_timeout(ctx.config.job_timeout);

        generate_thumbnail(&runner, &clip.file_path, &output, payload.time_offset).await?;

        progress.done(output.display().to_string()).await;
        Ok(())
    }
}
