//! Metadata-only fitness functions shared by the selection strategies.
//!
//! Every function returns a value in `[0, 1]` and never panics on odd input:
//! requirement values are normalized once by [`ResolvedRequirement::resolve`].

use cstudio_models::{Clip, CompositionRequirement, MusicTempo};

/// Target duration used when the requested one is missing or not positive.
pub const DEFAULT_TARGET_DURATION: f64 = 60.0;

/// Weight of duration fitness in the default score.
pub const DURATION_WEIGHT: f64 = 0.3;
/// Weight of theme/mood/style match in the default score.
pub const THEME_WEIGHT: f64 = 0.4;
/// Weight of technical quality in the default score.
pub const QUALITY_WEIGHT: f64 = 0.3;

/// Normalized duration constraints of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Budget {
    pub target: f64,
    pub min_clip: f64,
    pub max_clip: f64,
}

impl Budget {
    /// Normalize raw requirement values.
    ///
    /// Non-finite or negative values fall back to permissive defaults, swapped
    /// bounds are reordered and the minimum never exceeds the target.
    pub fn from_requirement(req: &CompositionRequirement) -> Self {
        let target = if req.target_duration.is_finite() && req.target_duration > 0.0 {
            req.target_duration
        } else {
            DEFAULT_TARGET_DURATION
        };

        let mut min_clip = if req.min_clip_duration.is_finite() && req.min_clip_duration > 0.0 {
            req.min_clip_duration
        } else {
            0.0
        };

        let mut max_clip = if req.max_clip_duration.is_finite() && req.max_clip_duration > 0.0 {
            req.max_clip_duration
        } else {
            target
        };

        if max_clip < min_clip {
            std::mem::swap(&mut min_clip, &mut max_clip);
        }
        min_clip = min_clip.min(target);

        Self {
            target,
            min_clip,
            max_clip,
        }
    }

    /// Midpoint of the clip duration window.
    pub fn ideal_clip(&self) -> f64 {
        (self.min_clip + self.max_clip) / 2.0
    }

    /// Whether a clip is long enough to be selected at all.
    pub fn is_eligible(&self, clip: &Clip) -> bool {
        clip.duration.is_finite() && clip.duration > 0.0 && clip.duration >= self.min_clip
    }
}

/// A requirement paired with its normalized budget.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedRequirement<'a> {
    pub requirement: &'a CompositionRequirement,
    pub budget: Budget,
}

impl<'a> ResolvedRequirement<'a> {
    pub fn resolve(requirement: &'a CompositionRequirement) -> Self {
        Self {
            requirement,
            budget: Budget::from_requirement(requirement),
        }
    }
}

fn same(wanted: &str, actual: &str) -> bool {
    !wanted.trim().is_empty() && wanted.trim().eq_ignore_ascii_case(actual.trim())
}

/// 1.0 at the midpoint of `[min, max]`, falling linearly to 0 at the bounds.
pub fn duration_fitness(duration: f64, budget: &Budget) -> f64 {
    if !duration.is_finite() || duration < budget.min_clip || duration > budget.max_clip {
        return 0.0;
    }

    let half_window = budget.max_clip - budget.ideal_clip();
    if half_window <= f64::EPSILON {
        return 1.0;
    }

    (1.0 - (duration - budget.ideal_clip()).abs() / half_window).clamp(0.0, 1.0)
}

/// Partial credit per matching attribute: category 0.5, mood 0.3, style 0.2.
pub fn theme_fitness(clip: &Clip, req: &CompositionRequirement) -> f64 {
    let mut fitness = 0.0;
    if same(&req.theme, &clip.category) {
        fitness += 0.5;
    }
    if same(&req.mood, &clip.mood) {
        fitness += 0.3;
    }
    if same(&req.style, &clip.style) {
        fitness += 0.2;
    }
    fitness
}

/// Resolution, bitrate and frame-rate tiers.
pub fn quality_fitness(clip: &Clip) -> f64 {
    let mut fitness = 0.0;

    match clip.dimensions() {
        Some((w, h)) if w >= 1920 && h >= 1080 => fitness += 0.5,
        Some((w, h)) if w >= 1280 && h >= 720 => fitness += 0.3,
        _ => {}
    }

    if clip.bitrate >= 2000 {
        fitness += 0.3;
    } else if clip.bitrate >= 1000 {
        fitness += 0.2;
    }

    if clip.frame_rate >= 30.0 {
        fitness += 0.2;
    }

    fitness
}

/// 1.0 for a primary color, 0.5 for a secondary one.
pub fn color_fitness(clip: &Clip, req: &CompositionRequirement) -> f64 {
    if req.primary_colors.iter().any(|c| same(c, &clip.color)) {
        1.0
    } else if req.secondary_colors.iter().any(|c| same(c, &clip.color)) {
        0.5
    } else {
        0.0
    }
}

/// The clip category's share in the content balance, relative to the
/// largest share requested.
pub fn balance_fitness(clip: &Clip, req: &CompositionRequirement) -> f64 {
    let largest = req
        .content_balance
        .values()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .fold(0.0_f64, f64::max);
    if largest <= 0.0 {
        return 0.0;
    }

    req.content_balance
        .iter()
        .find(|(category, _)| same(category, &clip.category))
        .map(|(_, share)| (share / largest).clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

/// 1.0 when the clip mood matches the requested mood.
pub fn mood_fitness(clip: &Clip, req: &CompositionRequirement) -> f64 {
    if same(&req.mood, &clip.mood) {
        1.0
    } else {
        0.0
    }
}

/// How well the clip length suits the tempo: slow tempos favour long clips,
/// fast tempos favour short ones.
pub fn tempo_fitness(duration: f64, tempo: Option<MusicTempo>, budget: &Budget) -> f64 {
    let span = budget.max_clip - budget.min_clip;
    let position = if span > f64::EPSILON {
        ((duration - budget.min_clip) / span).clamp(0.0, 1.0)
    } else {
        0.5
    };

    match tempo {
        Some(MusicTempo::Slow) => position,
        Some(MusicTempo::Fast) => 1.0 - position,
        Some(MusicTempo::Medium) => duration_fitness(duration.min(budget.max_clip), budget),
        None => 0.5,
    }
}

/// Similarity of two clips from shared declared metadata
/// (category, mood, style, color; 0.25 each).
pub fn similarity(a: &Clip, b: &Clip) -> f64 {
    [
        (&a.category, &b.category),
        (&a.mood, &b.mood),
        (&a.style, &b.style),
        (&a.color, &b.color),
    ]
    .iter()
    .filter(|(x, y)| same(x, y))
    .count() as f64
        * 0.25
}
