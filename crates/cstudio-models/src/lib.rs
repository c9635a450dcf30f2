//! Shared data models for the creative studio composition pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Clips and the catalog filters used to look them up
//! - Composition requirements and selected segments
//! - Timelines (clip placements, transitions, effects)
//! - Render options and encoding defaults
//! - Job identity/state and render progress

pub mod clip;
pub mod job;
pub mod progress;
pub mod render;
pub mod requirement;
pub mod segment;
pub mod timeline;
pub mod timestamp;

// Re-export common types
pub use clip::{Clip, ClipFilter, ClipId};
pub use job::{JobId, JobKind, JobState};
pub use progress::RenderProgress;
pub use render::{QualityTier, RenderOptions, VideoFilter};
pub use requirement::{CompositionRequirement, MusicTempo, TransitionStyle};
pub use segment::{ClipSegment, Transition, TransitionKind};
pub use timeline::{Timeline, TimelineEvent};
pub use timestamp::{format_seconds, parse_timestamp, TimestampError};
