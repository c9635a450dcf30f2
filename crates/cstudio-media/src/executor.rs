//! Render execution: runs a compiled plan to a finished file.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use cstudio_models::RenderProgress;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::command::FfmpegRunner;
use crate::error::{MediaError, MediaResult};
use crate::plan::RenderPlan;

/// A finished render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub path: PathBuf,
    pub file_size: u64,
    /// Planned output duration (seconds)
    pub duration: f64,
    pub elapsed: Duration,
}

/// Executes render plans with a configured encoder.
#[derive(Debug, Clone)]
pub struct RenderExecutor {
    runner: FfmpegRunner,
}

impl RenderExecutor {
    /// `runner` carries the encoder path and launcher; timeouts and
    /// cancellation are set per call.
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &FfmpegRunner {
        &self.runner
    }

    /// Run `plan`, writing to `output`.
    ///
    /// A non-zero exit fails the render even when progress was reported, and
    /// a run that exits cleanly without producing the file is a failure too.
    pub async fn execute<F>(
        &self,
        plan: &RenderPlan,
        output: &Path,
        cancel: CancellationToken,
        timeout: Option<Duration>,
        on_progress: F,
    ) -> MediaResult<RenderOutput>
    where
        F: FnMut(RenderProgress) + Send + 'static,
    {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut runner = self
            .runner
            .clone()
            .with_cancel(cancel)
            .with_total_duration(plan.total_duration);
        if let Some(timeout) = timeout {
            runner = runner.with_timeout(timeout);
        }

        let started = Instant::now();
        let cmd = plan.to_command(output);
        runner.run_with_progress(&cmd, on_progress).await?;

        let metadata = tokio::fs::metadata(output)
            .await
            .map_err(|_| MediaError::FileNotFound(output.to_path_buf()))?;

        let result = RenderOutput {
            path: output.to_path_buf(),
            file_size: metadata.len(),
            duration: plan.total_duration,
            elapsed: started.elapsed(),
        };

        info!(
            output = %result.path.display(),
            size = result.file_size,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Render finished"
        );

        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::plan::PlanCompiler;
    use cstudio_models::{Clip, RenderOptions, Timeline, TimelineEvent, ClipId};
    use std::sync::{Arc, Mutex};

    fn plan() -> RenderPlan {
        let timeline = Timeline::new(vec![TimelineEvent::Clip {
            start_time: 0.0,
            duration: 2.0,
            clip_id: ClipId(1),
            source_start: 0.0,
            source_end: 2.0,
        }]);
        PlanCompiler
            .compile(&timeline, &[Clip::new(1, "/media/a.mp4", 5.0)], &RenderOptions::default())
            .unwrap()
    }

    /// Fake encoder: writes progress and touches the last argument (the output).
    const FAKE_ENCODER: &str = r#"for last; do :; done
printf 'frame=25\nout_time=00:00:01.000000\nprogress=continue\n'
printf 'frame=50\nout_time=00:00:02.000000\nprogress=end\n'
printf 'rendered' > "$last"
"#;

    #[tokio::test]
    async fn test_execute_produces_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("encoder.sh");
        std::fs::write(&script, FAKE_ENCODER).unwrap();

        let executor = RenderExecutor::new(
            FfmpegRunner::with_program("/bin/sh").with_launcher_args([script.to_string_lossy().to_string()]),
        );
        let output = dir.path().join("renders").join("out.mp4");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let result = executor
            .execute(&plan(), &output, CancellationToken::new(), None, move |p| {
                sink.lock().unwrap().push(p.percent)
            })
            .await
            .unwrap();

        assert_eq!(result.file_size, "rendered".len() as u64);
        assert_eq!(result.duration, 2.0);
        assert_eq!(*seen.lock().unwrap(), vec![Some(50.0), Some(100.0)]);
    }

    #[tokio::test]
    async fn test_clean_exit_without_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("encoder.sh");
        std::fs::write(&script, "exit 0\n").unwrap();

        let executor = RenderExecutor::new(
            FfmpegRunner::with_program("/bin/sh").with_launcher_args([script.to_string_lossy().to_string()]),
        );
        let err = executor
            .execute(&plan(), &dir.path().join("out.mp4"), CancellationToken::new(), None, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
