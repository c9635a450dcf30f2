//! Prometheus metrics for the worker.

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Serve metrics on `0.0.0.0:<port>`.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .install()
        .map_err(|e| WorkerError::config_error(format!("cannot start metrics exporter: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_RECEIVED_TOTAL: &str = "cstudio_jobs_received_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "cstudio_jobs_completed_total";
    pub const JOBS_RETRIED_TOTAL: &str = "cstudio_jobs_retried_total";
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "cstudio_jobs_dead_lettered_total";
    pub const JOBS_SUBMITTED_TOTAL: &str = "cstudio_jobs_submitted_total";
    pub const SUBMISSIONS_REJECTED_TOTAL: &str = "cstudio_submissions_rejected_total";

    pub const RENDER_DURATION_SECONDS: &str = "cstudio_render_duration_seconds";
    pub const SELECTION_DURATION_SECONDS: &str = "cstudio_selection_duration_seconds";
}

pub fn record_job_received(job_type: &str) {
    let labels = [("type", job_type.to_string())];
    counter!(names::JOBS_RECEIVED_TOTAL, &labels).increment(1);
}

pub fn record_job_completed(job_type: &str) {
    let labels = [("type", job_type.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
}

pub fn record_job_retried(job_type: &str) {
    let labels = [("type", job_type.to_string())];
    counter!(names::JOBS_RETRIED_TOTAL, &labels).increment(1);
}

pub fn record_job_dead_lettered(job_type: &str) {
    let labels = [("type", job_type.to_string())];
    counter!(names::JOBS_DEAD_LETTERED_TOTAL, &labels).increment(1);
}

pub fn record_job_submitted(job_type: &str) {
    let labels = [("type", job_type.to_string())];
    counter!(names::JOBS_SUBMITTED_TOTAL, &labels).increment(1);
}

pub fn record_submission_rejected(job_type: &str) {
    let labels = [("type", job_type.to_string())];
    counter!(names::SUBMISSIONS_REJECTED_TOTAL, &labels).increment(1);
}

pub fn record_render_duration(job_type: &str, duration_secs: f64) {
    let labels = [("type", job_type.to_string())];
    histogram!(names::RENDER_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_selection_duration(strategy: &str, duration_secs: f64) {
    let labels = [("strategy", strategy.to_string())];
    histogram!(names::SELECTION_DURATION_SECONDS, &labels).record(duration_secs);
}
