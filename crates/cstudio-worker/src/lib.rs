//! Composition and render worker.
//!
//! This crate provides:
//! - Job executor with per-queue worker pools and graceful shutdown
//! - Handlers for composition, render and thumbnail jobs
//! - Synchronous submission checks before enqueueing
//! - Clip catalog and render sink collaborators
//! - Prometheus metrics and per-job structured logging

pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod retry;
pub mod sink;
pub mod submit;

pub use catalog::{ClipCatalog, InMemoryCatalog, JsonFileCatalog};
pub use config::{EncoderConfig, WorkerConfig};
pub use context::WorkerContext;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use handlers::{HandlerRegistry, JobHandler};
pub use logging::JobLogger;
pub use sink::{LogRenderSink, RenderRecord, RenderSink};
pub use submit::Submitter;
