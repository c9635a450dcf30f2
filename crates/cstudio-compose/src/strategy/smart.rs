//! Default weighted strategy.

use cstudio_models::Clip;

use super::SelectionStrategy;
use crate::scoring::{
    duration_fitness, quality_fitness, theme_fitness, ResolvedRequirement, DURATION_WEIGHT,
    QUALITY_WEIGHT, THEME_WEIGHT,
};

/// Duration fitness 30%, theme/mood/style match 40%, technical quality 30%.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmartSelectionStrategy;

impl SelectionStrategy for SmartSelectionStrategy {
    fn name(&self) -> &'static str {
        "smart_selection"
    }

    fn score(&self, clip: &Clip, req: &ResolvedRequirement<'_>) -> f64 {
        duration_fitness(clip.duration, &req.budget) * DURATION_WEIGHT
            + theme_fitness(clip, req.requirement) * THEME_WEIGHT
            + quality_fitness(clip) * QUALITY_WEIGHT
    }
}
