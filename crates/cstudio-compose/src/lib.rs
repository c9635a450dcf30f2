//! Composition engine: clip selection, timeline assembly and scoring.
//!
//! Selection is pluggable. Strategies implement [`SelectionStrategy`] and are
//! looked up by name in a [`StrategyRegistry`]; the [`Compositor`] ties a
//! chosen strategy to the [`TimelineAssembler`].

pub mod compositor;
pub mod error;
pub mod scoring;
pub mod strategy;
pub mod timeline;

pub use compositor::{Composition, CompositionMetadata, Compositor};
pub use error::{ComposeError, ComposeResult};
pub use scoring::{Budget, ResolvedRequirement};
pub use strategy::{
    EmotionDrivenStrategy, SelectionStrategy, SmartSelectionStrategy, StrategyRegistry,
    ThemeBasedStrategy, DEFAULT_STRATEGY,
};
pub use timeline::TimelineAssembler;
