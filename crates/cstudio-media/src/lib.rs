//! FFmpeg CLI wrapper for the render pipeline.
//!
//! This crate provides:
//! - Compilation of timelines into render plans (filter graph + encoder flags)
//! - Type-safe FFmpeg command building with multiple inputs
//! - A runner with progress parsing, timeout and cancellation
//! - Thumbnail extraction

pub mod command;
pub mod error;
pub mod executor;
pub mod plan;
pub mod progress;
pub mod thumbnail;

pub use command::{check_encoder, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use executor::{RenderExecutor, RenderOutput};
pub use plan::{PlanCompiler, RenderPlan};
pub use progress::ProgressParser;
pub use thumbnail::{generate_thumbnail, thumbnail_command};
