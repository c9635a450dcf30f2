//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use cstudio_media::FfmpegRunner;
use cstudio_models::JobKind;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent `smart_composition` jobs
    pub composition_concurrency: usize,
    /// Concurrent `render_video` jobs
    pub render_concurrency: usize,
    /// Concurrent `generate_thumbnail` jobs
    pub thumbnail_concurrency: usize,
    /// Upper bound on a single encoder run
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Root for rendered outputs and thumbnails
    pub work_dir: PathBuf,
    /// How long one receive call waits before checking for shutdown
    pub receive_wait: Duration,
    /// How often expired deliveries are returned to their queue (crash recovery)
    pub reclaim_interval: Duration,
    /// JSON clip catalog
    pub catalog_path: Option<PathBuf>,
    /// Prometheus listener port
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            composition_concurrency: 2,
            render_concurrency: 2,
            thumbnail_concurrency: 4,
            job_timeout: Duration::from_secs(3600), // 1 hour
            shutdown_timeout: Duration::from_secs(30),
            work_dir: PathBuf::from("/tmp/cstudio"),
            receive_wait: Duration::from_secs(1),
            reclaim_interval: Duration::from_secs(30),
            catalog_path: None,
            metrics_port: None,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            composition_concurrency: env_or(
                "WORKER_COMPOSITION_CONCURRENCY",
                defaults.composition_concurrency,
            ),
            render_concurrency: env_or("WORKER_RENDER_CONCURRENCY", defaults.render_concurrency),
            thumbnail_concurrency: env_or(
                "WORKER_THUMBNAIL_CONCURRENCY",
                defaults.thumbnail_concurrency,
            ),
            job_timeout: Duration::from_secs(env_or("WORKER_JOB_TIMEOUT", 3600)),
            shutdown_timeout: Duration::from_secs(env_or("WORKER_SHUTDOWN_TIMEOUT", 30)),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            receive_wait: defaults.receive_wait,
            reclaim_interval: Duration::from_secs(env_or("WORKER_RECLAIM_INTERVAL_SECS", 30)),
            catalog_path: std::env::var("CLIP_CATALOG_PATH").ok().map(PathBuf::from),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.trim().parse().ok()),
        }
    }

    /// Worker count for a queue. Zero disables the queue.
    pub fn concurrency_for(&self, kind: JobKind) -> usize {
        match kind {
            JobKind::SmartComposition => self.composition_concurrency,
            JobKind::RenderVideo => self.render_concurrency,
            JobKind::GenerateThumbnail => self.thumbnail_concurrency,
        }
    }

    /// A delivery lease no longer than the job timeout lets a healthy job be
    /// reclaimed and run twice.
    pub fn check_lease(&self, lease: Duration) -> WorkerResult<()> {
        if lease <= self.job_timeout {
            return Err(WorkerError::config_error(format!(
                "queue lease ({}s) must exceed WORKER_JOB_TIMEOUT ({}s)",
                lease.as_secs(),
                self.job_timeout.as_secs()
            )));
        }
        Ok(())
    }

    pub fn renders_dir(&self) -> PathBuf {
        self.work_dir.join("renders")
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.work_dir.join("thumbnails")
    }
}

/// External encoder settings.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// `ffmpeg` on PATH or an absolute path
    pub ffmpeg_path: PathBuf,
    /// Arguments placed before every invocation (wrapper scripts)
    pub launcher_args: Vec<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            launcher_args: Vec::new(),
        }
    }
}

impl EncoderConfig {
    pub fn from_env() -> Self {
        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
            launcher_args: Vec::new(),
        }
    }

    pub fn runner(&self) -> FfmpegRunner {
        FfmpegRunner::with_program(&self.ffmpeg_path).with_launcher_args(self.launcher_args.clone())
    }
}
