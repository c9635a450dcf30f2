//! Theme-coherence strategy with content-balance quotas.

use std::collections::HashMap;

use cstudio_models::{Clip, ClipSegment};

use super::{fill_budget, rank, SegmentPlanner, SelectionStrategy};
use crate::error::ComposeResult;
use crate::scoring::{balance_fitness, color_fitness, quality_fitness, ResolvedRequirement};

/// Scores theme/category match, palette and content-balance share.
///
/// When `content_balance` is set, each listed category may fill at most its
/// share of the target duration. Unlisted categories are unconstrained.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThemeBasedStrategy;

impl SelectionStrategy for ThemeBasedStrategy {
    fn name(&self) -> &'static str {
        "theme_based"
    }

    fn score(&self, clip: &Clip, req: &ResolvedRequirement<'_>) -> f64 {
        let r = req.requirement;
        let theme = if !r.theme.trim().is_empty() && r.theme.trim().eq_ignore_ascii_case(clip.category.trim()) {
            1.0
        } else {
            0.0
        };

        let score = theme * 0.5 + color_fitness(clip, r) * 0.2 + balance_fitness(clip, r) * 0.3;
        if r.prefer_high_quality {
            score * quality_fitness(clip)
        } else {
            score
        }
    }

    fn select(&self, clips: &[Clip], req: &ResolvedRequirement<'_>) -> ComposeResult<Vec<ClipSegment>> {
        let ranked = rank(clips, req, |clip| self.score(clip, req))?;
        let mut quotas = CategoryQuotas::from_requirement(req);
        fill_budget(&ranked, req, self.name(), &mut quotas)
    }
}

/// Remaining seconds per balanced category (lowercased).
struct CategoryQuotas {
    remaining: HashMap<String, f64>,
    min_clip: f64,
}

impl CategoryQuotas {
    fn from_requirement(req: &ResolvedRequirement<'_>) -> Self {
        let remaining = req
            .requirement
            .content_balance
            .iter()
            .filter(|(_, share)| share.is_finite() && **share >= 0.0)
            .map(|(category, share)| {
                (
                    category.trim().to_ascii_lowercase(),
                    (*share).min(1.0) * req.budget.target,
                )
            })
            .collect();

        Self {
            remaining,
            min_clip: req.budget.min_clip,
        }
    }
}

impl SegmentPlanner for CategoryQuotas {
    fn plan(&self, clip: &Clip, _remaining: f64) -> Option<f64> {
        match self.remaining.get(&clip.category.trim().to_ascii_lowercase()) {
            Some(quota) if *quota <= 0.0 || *quota < self.min_clip => None,
            Some(quota) => Some((*quota).min(clip.duration)),
            None => Some(clip.duration),
        }
    }

    fn commit(&mut self, clip: &Clip, duration: f64) {
        if let Some(quota) = self.remaining.get_mut(&clip.category.trim().to_ascii_lowercase()) {
            *quota -= duration;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::clips;
    use cstudio_models::{ClipId, CompositionRequirement};

    fn categorized(categories: &[&str], duration: f64) -> Vec<Clip> {
        let durations = vec![duration; categories.len()];
        clips(&durations)
            .into_iter()
            .zip(categories)
            .map(|(clip, category)| clip.with_category(*category))
            .collect()
    }

    #[test]
    fn test_balance_caps_category_share() {
        let pool = categorized(&["close_up", "close_up", "close_up", "wide_shot", "wide_shot"], 10.0);
        let mut req = CompositionRequirement::new(40.0, 5.0, 10.0);
        req.content_balance.insert("close_up".into(), 0.5);
        req.content_balance.insert("wide_shot".into(), 0.5);

        let segments = ThemeBasedStrategy
            .select(&pool, &ResolvedRequirement::resolve(&req))
            .unwrap();

        let close_up: f64 = segments
            .iter()
            .filter(|s| s.clip_id.as_u64() <= 3)
            .map(|s| s.duration)
            .sum();
        assert_eq!(close_up, 20.0);
        assert_eq!(segments.iter().map(|s| s.duration).sum::<f64>(), 40.0);
    }

    #[test]
    fn test_theme_match_ranks_first() {
        let pool = categorized(&["city", "nature", "city"], 8.0);
        let req = CompositionRequirement::new(8.0, 2.0, 8.0).with_theme("nature");
        let segments = ThemeBasedStrategy
            .select(&pool, &ResolvedRequirement::resolve(&req))
            .unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].clip_id, ClipId(2));
    }

    #[test]
    fn test_prefer_high_quality_scales_score() {
        let clip = Clip::new(1, "a.mp4", 5.0)
            .with_category("nature")
            .with_technical("1280x720", 500, 24.0);
        let mut req = CompositionRequirement::new(10.0, 1.0, 5.0).with_theme("nature");
        req.prefer_high_quality = true;

        let score = ThemeBasedStrategy.score(&clip, &ResolvedRequirement::resolve(&req));
        assert!((score - 0.5 * 0.3).abs() < 1e-9);
    }
}
