//! End-to-end worker runs against the in-memory queue and a fake encoder.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cstudio_models::{Clip, ClipId, ClipSegment, CompositionRequirement, JobKind, JobState};
use cstudio_queue::{
    CompositionPayload, Job, JobQueue, MemoryBackend, QueueConfig, RenderPayload,
    ThumbnailPayload,
};
use cstudio_worker::{
    EncoderConfig, InMemoryCatalog, JobExecutor, RenderRecord, RenderSink, Submitter,
    WorkerConfig, WorkerContext,
};
use tempfile::TempDir;

/// Writes progress and touches the last argument (the output file).
const FAKE_ENCODER: &str = r#"for last; do :; done
printf 'frame=25\nout_time=00:00:01.000000\nprogress=continue\n'
printf 'frame=50\nout_time=00:00:02.000000\nprogress=end\n'
printf 'rendered' > "$last"
"#;

const BROKEN_ENCODER: &str = "echo 'Conversion failed!' >&2\nexit 1\n";

#[derive(Default)]
struct CollectingSink {
    records: Mutex<Vec<RenderRecord>>,
}

impl CollectingSink {
    fn records(&self) -> Vec<RenderRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenderSink for CollectingSink {
    async fn record(&self, record: RenderRecord) {
        self.records.lock().unwrap().push(record);
    }
}

struct Harness {
    dir: TempDir,
    executor: Arc<JobExecutor>,
    sink: Arc<CollectingSink>,
    running: tokio::task::JoinHandle<()>,
}

impl Harness {
    async fn start(encoder_script: &str, max_retry: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("encoder.sh");
        std::fs::write(&script, encoder_script).unwrap();

        let media = dir.path().join("media");
        std::fs::create_dir_all(&media).unwrap();
        let clips: Vec<Clip> = [(1u64, 6.0, "nature"), (2, 8.0, "nature"), (3, 4.0, "city")]
            .into_iter()
            .map(|(id, duration, category)| {
                let path = media.join(format!("{}.mp4", id));
                std::fs::write(&path, b"source").unwrap();
                Clip::new(id, path, duration).with_category(category)
            })
            .collect();

        let config = WorkerConfig {
            work_dir: dir.path().join("work"),
            receive_wait: Duration::from_millis(20),
            shutdown_timeout: Duration::from_secs(2),
            job_timeout: Duration::from_secs(10),
            ..WorkerConfig::default()
        };
        let queue = JobQueue::new(
            Arc::new(MemoryBackend::new()),
            QueueConfig {
                default_max_retry: max_retry,
                ..QueueConfig::memory()
            },
        );
        let encoder = EncoderConfig {
            ffmpeg_path: PathBuf::from("/bin/sh"),
            launcher_args: vec![script.to_string_lossy().to_string()],
        };
        let sink = Arc::new(CollectingSink::default());
        let ctx = WorkerContext::new(config, queue, &encoder, Arc::new(InMemoryCatalog::new(clips)))
            .with_sink(sink.clone());

        let executor = Arc::new(JobExecutor::new(ctx));
        let running = tokio::spawn({
            let executor = executor.clone();
            async move { executor.run().await.unwrap() }
        });

        Self {
            dir,
            executor,
            sink,
            running,
        }
    }

    fn submitter(&self) -> Submitter {
        Submitter::from_context(self.executor.context())
    }

    fn queue(&self) -> &JobQueue {
        &self.executor.context().queue
    }

    fn work_dir(&self) -> &Path {
        &self.executor.context().config.work_dir
    }

    async fn wait_for_records(&self, count: usize) -> Vec<RenderRecord> {
        for _ in 0..500 {
            let records = self.sink.records();
            if records.len() >= count {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} render records, got {:?}", count, self.sink.records());
    }

    async fn stop(self) {
        self.executor.shutdown();
        self.running.await.unwrap();
        drop(self.dir);
    }
}

fn composition(project: &str) -> CompositionPayload {
    CompositionPayload {
        project_id: project.to_string(),
        requirement: CompositionRequirement {
            target_duration: 10.0,
            theme: "nature".to_string(),
            ..CompositionRequirement::default()
        },
        strategy: None,
        filter: Default::default(),
        render_options: Default::default(),
        output_name: Some("promo".to_string()),
    }
}

#[tokio::test]
async fn test_composition_end_to_end() {
    let harness = Harness::start(FAKE_ENCODER, 3).await;
    let job_id = harness
        .submitter()
        .submit_composition(composition("project-1"), Some(5))
        .await
        .unwrap();

    let records = harness.wait_for_records(1).await;
    let record = &records[0];
    assert_eq!(record.job_id, job_id);
    assert_eq!(record.project_id, "project-1");
    assert_eq!(record.status, JobState::Completed);
    assert_eq!(record.error, None);
    assert!(record.duration > 0.0);

    let output = record.output_path.clone().unwrap();
    assert!(output.starts_with(harness.work_dir().join("renders")));
    assert!(output
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("promo"));
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "rendered");
    assert_eq!(record.file_size, "rendered".len() as u64);

    assert_eq!(harness.queue().dlq_len(JobKind::SmartComposition).await.unwrap(), 0);
    harness.stop().await;
}

#[tokio::test]
async fn test_thumbnail_written_to_work_dir() {
    let harness = Harness::start(FAKE_ENCODER, 3).await;
    let job_id = harness
        .submitter()
        .submit_thumbnail(
            ThumbnailPayload {
                clip_id: ClipId(2),
                time_offset: 1.5,
            },
            None,
        )
        .await
        .unwrap();

    let expected = harness
        .work_dir()
        .join("thumbnails")
        .join(format!("2_{}.jpg", job_id));
    for _ in 0..500 {
        if expected.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(std::fs::read_to_string(&expected).unwrap(), "rendered");
    harness.stop().await;
}

#[tokio::test]
async fn test_unknown_clip_is_dead_lettered_without_retry() {
    let harness = Harness::start(FAKE_ENCODER, 3).await;

    // Bypasses the submitter, which would reject it.
    let job = Job::render(RenderPayload {
        task_id: "task-9".to_string(),
        project_id: "project-9".to_string(),
        segments: vec![ClipSegment::new(ClipId(99), 0.0, 2.0)],
        transition_style: String::new(),
        render_options: Default::default(),
    });
    harness.queue().enqueue(&job).await.unwrap();

    let records = harness.wait_for_records(1).await;
    assert_eq!(records[0].job_id, job.id);
    assert_eq!(records[0].status, JobState::DeadLettered);
    assert!(records[0].error.as_deref().unwrap().contains("99"));
    assert_eq!(harness.queue().dlq_len(JobKind::RenderVideo).await.unwrap(), 1);
    harness.stop().await;
}

#[tokio::test]
async fn test_failing_encoder_exhausts_retries() {
    let harness = Harness::start(BROKEN_ENCODER, 2).await;
    harness
        .submitter()
        .submit_composition(composition("project-2"), None)
        .await
        .unwrap();

    let records = harness.wait_for_records(1).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, JobState::DeadLettered);
    assert!(records[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("retries exhausted (2/2)"));
    assert_eq!(harness.queue().dlq_len(JobKind::SmartComposition).await.unwrap(), 1);
    assert_eq!(harness.queue().len(JobKind::SmartComposition).await.unwrap(), 0);
    harness.stop().await;
}

#[tokio::test]
async fn test_submission_rejected_for_empty_selection() {
    let harness = Harness::start(FAKE_ENCODER, 3).await;
    let mut payload = composition("project-3");
    payload.filter.category = Some("underwater".to_string());

    assert!(harness.submitter().submit_composition(payload, None).await.is_err());
    assert_eq!(harness.queue().len(JobKind::SmartComposition).await.unwrap(), 0);
    harness.stop().await;
}
