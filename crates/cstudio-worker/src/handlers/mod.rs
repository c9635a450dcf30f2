//! Per-job-type handlers.
//!
//! Handlers must tolerate being run again from the start: a retry repeats
//! the whole body, so outputs are written to deterministic paths and
//! overwritten.

mod compose;
mod render;
mod thumbnail;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use cstudio_media::RenderOutput;
use cstudio_models::{format_seconds, Clip, JobKind, RenderOptions, Timeline};
use cstudio_queue::{Job, JobProgress};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::context::WorkerContext;
use crate::error::WorkerResult;
use crate::metrics;

pub use compose::CompositionHandler;
pub use render::{validate_segments, RenderHandler};
pub(crate) use render::resolve_clips;
pub use thumbnail::{validate_offset, ThumbnailHandler};

/// Processes one job type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Run `job` to completion. `cancel` fires on shutdown.
    async fn handle(
        &self,
        ctx: &WorkerContext,
        job: &Job,
        cancel: CancellationToken,
    ) -> WorkerResult<()>;
}

/// Handlers keyed by the job type they consume.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<JobKind, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Registry with a handler for every job type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CompositionHandler));
        registry.register(Arc::new(RenderHandler));
        registry.register(Arc::new(ThumbnailHandler));
        registry
    }

    /// Register a handler, replacing any previous one for its kind.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = JobKind> + '_ {
        self.handlers.keys().copied()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// What to render and where.
pub(crate) struct RenderRequest<'a> {
    pub timeline: &'a Timeline,
    pub clips: &'a [Clip],
    pub options: &'a RenderOptions,
    /// Output file stem
    pub stem: &'a str,
}

/// Compile and execute a timeline, forwarding encoder progress to the
/// job's progress channel.
pub(crate) async fn render_timeline(
    ctx: &WorkerContext,
    job: &Job,
    progress: &JobProgress,
    request: RenderRequest<'_>,
    cancel: CancellationToken,
) -> WorkerResult<RenderOutput> {
    let plan = ctx
        .compiler
        .compile(request.timeline, request.clips, request.options)?;
    let output = ctx
        .config
        .renders_dir()
        .join(plan.output_file_name(&safe_stem(request.stem)));

    progress
        .log(format!(
            "Rendering {} inputs ({}) to {}",
            plan.inputs.len(),
            format_seconds(plan.total_duration),
            output.display()
        ))
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let forward = progress.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            forward.progress(update).await;
        }
    });

    let result = ctx
        .executor
        .execute(&plan, &output, cancel, Some(ctx.config.job_timeout), move |update| {
            let _ = tx.send(update);
        })
        .await;
    let _ = forwarder.await;

    let rendered = result?;
    metrics::record_render_duration(job.kind().as_str(), rendered.elapsed.as_secs_f64());
    Ok(rendered)
}

/// File stem limited to `[A-Za-z0-9_-]`.
fn safe_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "output".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_defaults_cover_every_kind() {
        let registry = HandlerRegistry::default();
        for kind in JobKind::ALL {
            assert_eq!(registry.get(kind).map(|h| h.kind()), Some(kind));
        }
        assert_eq!(registry.kinds().count(), 3);
    }

    #[test]
    fn test_safe_stem() {
        assert_eq!(safe_stem("promo-2024_v1"), "promo-2024_v1");
        assert_eq!(safe_stem("../etc/passwd"), "___etc_passwd");
        assert_eq!(safe_stem(""), "output");
    }
}
