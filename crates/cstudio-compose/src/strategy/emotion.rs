//! Mood and pacing strategy.

use cstudio_models::{Clip, ClipSegment, MusicTempo};

use super::{fill_budget, rank, SegmentPlanner, SelectionStrategy};
use crate::error::ComposeResult;
use crate::scoring::{mood_fitness, tempo_fitness, Budget, ResolvedRequirement};

/// Favors clips whose mood matches and whose length suits the tempo.
///
/// Segments are cut to a tempo-derived length: the longest allowed clip for
/// slow music, the shortest for fast music, the window midpoint otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmotionDrivenStrategy;

impl SelectionStrategy for EmotionDrivenStrategy {
    fn name(&self) -> &'static str {
        "emotion_driven"
    }

    fn score(&self, clip: &Clip, req: &ResolvedRequirement<'_>) -> f64 {
        mood_fitness(clip, req.requirement) * 0.6
            + tempo_fitness(clip.duration, req.requirement.tempo(), &req.budget) * 0.4
    }

    fn select(&self, clips: &[Clip], req: &ResolvedRequirement<'_>) -> ComposeResult<Vec<ClipSegment>> {
        let ranked = rank(clips, req, |clip| self.score(clip, req))?;
        let mut pacing = TempoPacing::new(req.requirement.tempo(), req.budget);
        fill_budget(&ranked, req, self.name(), &mut pacing)
    }
}

struct TempoPacing {
    preferred: Option<f64>,
}

impl TempoPacing {
    fn new(tempo: Option<MusicTempo>, budget: Budget) -> Self {
        let preferred = tempo.map(|tempo| match tempo {
            MusicTempo::Slow => budget.max_clip,
            MusicTempo::Medium => budget.ideal_clip(),
            MusicTempo::Fast => budget.min_clip,
        });
        Self { preferred }
    }
}

impl SegmentPlanner for TempoPacing {
    fn plan(&self, clip: &Clip, _remaining: f64) -> Option<f64> {
        Some(match self.preferred {
            Some(len) if len > 0.0 => len,
            _ => clip.duration,
        })
    }
}
