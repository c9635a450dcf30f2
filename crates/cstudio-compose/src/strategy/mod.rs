//! Selection strategies.
//!
//! Each strategy scores candidates on its own terms, then shares the same
//! greedy budget fill: highest score first, unused clips only, each clip at
//! least the minimum clip duration, trimmed to the remaining budget.

use cstudio_models::{Clip, ClipSegment};

use crate::error::{ComposeError, ComposeResult};
use crate::scoring::{Budget, ResolvedRequirement};

/// Shortest segment worth emitting. Anything below this is floating-point
/// leftover from subtracting segment lengths off the budget.
pub const MIN_SEGMENT_SECS: f64 = 1e-3;

mod emotion;
mod registry;
mod smart;
mod theme;

pub use emotion::EmotionDrivenStrategy;
pub use registry::{StrategyRegistry, DEFAULT_STRATEGY};
pub use smart::SmartSelectionStrategy;
pub use theme::ThemeBasedStrategy;

/// A named clip scoring and selection algorithm.
pub trait SelectionStrategy: Send + Sync {
    /// Registry name (e.g. "smart_selection").
    fn name(&self) -> &'static str;

    /// Score a single candidate. Higher is better.
    fn score(&self, clip: &Clip, req: &ResolvedRequirement<'_>) -> f64;

    /// Select an ordered list of segments that fits the duration budget.
    fn select(&self, clips: &[Clip], req: &ResolvedRequirement<'_>) -> ComposeResult<Vec<ClipSegment>> {
        let ranked = rank(clips, req, |clip| self.score(clip, req))?;
        fill_budget(&ranked, req, self.name(), &mut FullClip)
    }
}

/// A candidate with its score and catalog position.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub clip: &'a Clip,
    pub score: f64,
    pub index: usize,
}

/// Score every clip and sort descending.
///
/// The sort is stable, so equal scores keep catalog order.
pub(crate) fn rank<'a>(
    clips: &'a [Clip],
    req: &ResolvedRequirement<'_>,
    score: impl Fn(&Clip) -> f64,
) -> ComposeResult<Vec<Candidate<'a>>> {
    if clips.is_empty() {
        return Err(ComposeError::NoCandidates);
    }
    if !clips.iter().any(|clip| req.budget.is_eligible(clip)) {
        return Err(ComposeError::NoEligibleClips {
            min_clip_duration: req.budget.min_clip,
        });
    }

    let mut ranked: Vec<Candidate<'a>> = clips
        .iter()
        .enumerate()
        .map(|(index, clip)| {
            let score = score(clip);
            Candidate {
                clip,
                score: if score.is_finite() { score } else { 0.0 },
                index,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(ranked)
}

/// Decides how much of an accepted clip to take.
pub(crate) trait SegmentPlanner {
    /// Desired segment length, or `None` to skip the clip for now.
    /// The result is clamped to the clip, the budget and the clip bounds.
    fn plan(&self, clip: &Clip, remaining: f64) -> Option<f64>;

    /// Called after a segment is appended.
    fn commit(&mut self, _clip: &Clip, _duration: f64) {}
}

/// Take as much of each clip as the bounds allow.
pub(crate) struct FullClip;

impl SegmentPlanner for FullClip {
    fn plan(&self, clip: &Clip, _remaining: f64) -> Option<f64> {
        Some(clip.duration)
    }
}

fn segment_length(desired: f64, clip: &Clip, budget: &Budget, remaining: f64) -> f64 {
    let upper = clip.duration.min(budget.max_clip).min(remaining);
    desired.max(budget.min_clip).min(upper)
}

/// Greedy budget fill over ranked candidates.
pub(crate) fn fill_budget(
    ranked: &[Candidate<'_>],
    req: &ResolvedRequirement<'_>,
    reason: &str,
    planner: &mut dyn SegmentPlanner,
) -> ComposeResult<Vec<ClipSegment>> {
    let budget = req.budget;
    let mut used = vec![false; ranked.len()];
    let mut remaining = budget.target;
    let mut selected: Vec<ClipSegment> = Vec::new();
    let mut previous_category: Option<&str> = None;

    while remaining >= MIN_SEGMENT_SECS && remaining >= budget.min_clip {
        let mut accepted = ranked
            .iter()
            .enumerate()
            .filter(|(pos, c)| !used[*pos] && budget.is_eligible(c.clip))
            .filter_map(|(pos, c)| planner.plan(c.clip, remaining).map(|len| (pos, c, len)));

        let pick = if req.requirement.avoid_repetition {
            let all: Vec<_> = accepted.collect();
            all.iter()
                .find(|(_, c, _)| {
                    previous_category.map_or(true, |prev| !prev.eq_ignore_ascii_case(&c.clip.category))
                })
                .or_else(|| all.first())
                .copied()
        } else {
            accepted.next()
        };

        let Some((pos, candidate, desired)) = pick else {
            break;
        };

        let length = segment_length(desired, candidate.clip, &budget, remaining);
        if length < MIN_SEGMENT_SECS {
            used[pos] = true;
            continue;
        }

        selected.push(ClipSegment::new(candidate.clip.id, 0.0, length).with_score(
            candidate.score,
            format!("{} (score {:.3})", reason, candidate.score),
        ));
        planner.commit(candidate.clip, length);
        used[pos] = true;
        previous_category = Some(candidate.clip.category.as_str());
        remaining -= length;
    }

    if selected.is_empty() {
        return Err(ComposeError::NoEligibleClips {
            min_clip_duration: budget.min_clip,
        });
    }

    Ok(selected)
}


#[cfg(test)]
mod tests {
    use super::test_support::clips;
    use super::*;
    use cstudio_models::{ClipId, CompositionRequirement};

    struct Flat;

    impl SelectionStrategy for Flat {
        fn name(&self) -> &'static str {
            "flat"
        }

        fn score(&self, _clip: &Clip, _req: &ResolvedRequirement<'_>) -> f64 {
            1.0
        }
    }

    #[test]
    fn test_fills_budget_until_below_minimum() {
        let req = CompositionRequirement::new(30.0, 5.0, 15.0);
        let segments = Flat
            .select(&clips(&[10.0, 10.0, 10.0]), &ResolvedRequirement::resolve(&req))
            .unwrap();

        assert_eq!(segments.len(), 3);
        assert_eq!(segments.iter().map(|s| s.duration).sum::<f64>(), 30.0);
    }

    #[test]
    fn test_equal_scores_keep_catalog_order() {
        let req = CompositionRequirement::new(100.0, 1.0, 50.0);
        let segments = Flat
            .select(&clips(&[4.0, 6.0, 5.0]), &ResolvedRequirement::resolve(&req))
            .unwrap();
        let ids: Vec<ClipId> = segments.iter().map(|s| s.clip_id).collect();
        assert_eq!(ids, vec![ClipId(1), ClipId(2), ClipId(3)]);
    }

    #[test]
    fn test_stops_when_remaining_below_minimum() {
        let req = CompositionRequirement::new(25.0, 5.0, 15.0);
        let segments = Flat
            .select(&clips(&[12.0, 12.0, 12.0]), &ResolvedRequirement::resolve(&req))
            .unwrap();

        let durations: Vec<f64> = segments.iter().map(|s| s.duration).collect();
        assert_eq!(durations, vec![12.0, 12.0]);
    }

    #[test]
    fn test_last_segment_trimmed_to_remaining_budget() {
        let req = CompositionRequirement::new(25.0, 0.5, 15.0);
        let segments = Flat
            .select(&clips(&[12.0, 12.0, 12.0]), &ResolvedRequirement::resolve(&req))
            .unwrap();

        let durations: Vec<f64> = segments.iter().map(|s| s.duration).collect();
        assert_eq!(durations, vec![12.0, 12.0, 1.0]);
        assert_eq!(segments[2].end_time, 1.0);
    }

    #[test]
    fn test_never_shorter_than_minimum() {
        let req = CompositionRequirement::new(23.0, 5.0, 15.0);
        let segments = Flat
            .select(&clips(&[9.0, 4.0, 9.0, 7.0]), &ResolvedRequirement::resolve(&req))
            .unwrap();

        assert!(segments.iter().all(|s| s.duration >= 5.0));
        assert!(segments.iter().all(|s| s.clip_id != ClipId(2)));
        let total: f64 = segments.iter().map(|s| s.duration).sum();
        assert!(total <= 23.0);
    }

    #[test]
    fn test_decimal_durations_leave_no_crumb_segment() {
        let req = CompositionRequirement::new(1.0, 0.0, 0.0);
        let segments = SmartSelectionStrategy
            .select(&clips(&[0.1; 20]), &ResolvedRequirement::resolve(&req))
            .unwrap();

        assert_eq!(segments.len(), 10);
        assert!(segments.iter().all(|s| s.duration >= MIN_SEGMENT_SECS));
        let total: f64 = segments.iter().map(|s| s.duration).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_errors() {
        let req = CompositionRequirement::new(30.0, 5.0, 15.0);
        let resolved = ResolvedRequirement::resolve(&req);
        assert_eq!(Flat.select(&[], &resolved), Err(ComposeError::NoCandidates));
        assert_eq!(
            Flat.select(&clips(&[2.0, 3.0]), &resolved),
            Err(ComposeError::NoEligibleClips { min_clip_duration: 5.0 })
        );
    }

    #[test]
    fn test_avoid_repetition_alternates_categories() {
        let mut pool = clips(&[10.0, 10.0, 10.0]);
        pool[0].category = "city".into();
        pool[1].category = "city".into();
        pool[2].category = "nature".into();

        let req = CompositionRequirement::new(20.0, 5.0, 10.0).with_avoid_repetition(true);
        let segments = Flat.select(&pool, &ResolvedRequirement::resolve(&req)).unwrap();
        let ids: Vec<ClipId> = segments.iter().map(|s| s.clip_id).collect();
        assert_eq!(ids, vec![ClipId(1), ClipId(3)]);
    }
}
