//! End-to-end composition: select, assemble, score.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use cstudio_models::{Clip, ClipId, ClipSegment, CompositionRequirement, Timeline};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ComposeError, ComposeResult};
use crate::scoring::{similarity, ResolvedRequirement};
use crate::strategy::StrategyRegistry;
use crate::timeline::TimelineAssembler;

/// Descriptive metadata attached to a composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionMetadata {
    /// Strategy that actually ran (after fallback)
    pub strategy: String,
    pub clip_count: usize,
    pub generated_at: DateTime<Utc>,
}

/// A generated composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub segments: Vec<ClipSegment>,
    pub timeline: Timeline,
    pub total_duration: f64,
    /// Mean segment score
    pub quality_score: f64,
    /// Mean metadata similarity of adjacent segments
    pub cohesion_score: f64,
    pub metadata: CompositionMetadata,
}

/// Runs a selection strategy and lays the result out on a timeline.
#[derive(Clone, Default)]
pub struct Compositor {
    registry: StrategyRegistry,
    assembler: TimelineAssembler,
}

impl Compositor {
    pub fn new(registry: StrategyRegistry) -> Self {
        Self {
            registry,
            assembler: TimelineAssembler::new(),
        }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Select clips only (no timeline). Used for dry-run validation.
    pub fn select(
        &self,
        clips: &[Clip],
        requirement: &CompositionRequirement,
        strategy: Option<&str>,
    ) -> ComposeResult<Vec<ClipSegment>> {
        let strategy = self.registry.resolve(strategy);
        strategy.select(clips, &ResolvedRequirement::resolve(requirement))
    }

    pub fn compose(
        &self,
        clips: &[Clip],
        requirement: &CompositionRequirement,
        strategy: Option<&str>,
    ) -> ComposeResult<Composition> {
        self.compose_with_rng(clips, requirement, strategy, &mut rand::rng())
    }

    pub fn compose_with_rng<R: Rng + ?Sized>(
        &self,
        clips: &[Clip],
        requirement: &CompositionRequirement,
        strategy: Option<&str>,
        rng: &mut R,
    ) -> ComposeResult<Composition> {
        let started = Instant::now();
        let strategy = self.registry.resolve(strategy);
        info!(
            strategy = strategy.name(),
            candidates = clips.len(),
            target_duration = requirement.target_duration,
            "Starting composition"
        );

        let resolved = ResolvedRequirement::resolve(requirement);
        let mut segments = strategy.select(clips, &resolved)?;
        let timeline = self
            .assembler
            .assemble_with_rng(&mut segments, requirement.transition(), rng);

        let by_id: HashMap<ClipId, &Clip> = clips.iter().map(|c| (c.id, c)).collect();
        let quality_score = quality_score(&segments);
        let cohesion_score = cohesion_score(&segments, &by_id)?;

        let composition = Composition {
            total_duration: timeline.total_duration,
            metadata: CompositionMetadata {
                strategy: strategy.name().to_string(),
                clip_count: segments.len(),
                generated_at: Utc::now(),
            },
            segments,
            timeline,
            quality_score,
            cohesion_score,
        };

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Composition timing");
        info!(
            clips = composition.metadata.clip_count,
            duration = composition.total_duration,
            quality = composition.quality_score,
            cohesion = composition.cohesion_score,
            "Composition generated"
        );

        Ok(composition)
    }
}

/// Mean segment score, 0 for an empty selection.
pub fn quality_score(segments: &[ClipSegment]) -> f64 {
    if segments.is_empty() {
        return 0.0;
    }
    segments.iter().map(|s| s.score).sum::<f64>() / segments.len() as f64
}

/// Mean similarity of adjacent segments, 1.0 for zero or one segment.
pub fn cohesion_score(segments: &[ClipSegment], clips: &HashMap<ClipId, &Clip>) -> ComposeResult<f64> {
    if segments.len() <= 1 {
        return Ok(1.0);
    }

    let lookup = |id: ClipId| clips.get(&id).copied().ok_or(ComposeError::UnknownClip(id));

    let mut total = 0.0;
    for pair in segments.windows(2) {
        total += similarity(lookup(pair[0].clip_id)?, lookup(pair[1].clip_id)?);
    }
    Ok(total / (segments.len() - 1) as f64)
}
