//! Timeline assembly: absolute placement and transitions.

use cstudio_models::{
    ClipSegment, Timeline, TimelineEvent, Transition, TransitionKind, TransitionStyle,
};
use rand::seq::IndexedRandom;
use rand::Rng;

/// Hard cut used by the fast style.
pub const FAST_TRANSITION_SECS: f64 = 0.1;
/// Long dissolve used by the smooth style.
pub const SMOOTH_TRANSITION_SECS: f64 = 1.0;
/// Fixed length of randomly chosen dynamic transitions.
pub const DYNAMIC_TRANSITION_SECS: f64 = 0.3;
/// Dissolve used when no style is requested.
pub const DEFAULT_TRANSITION_SECS: f64 = 0.5;

/// Orders segments in time and inserts a transition at every boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimelineAssembler;

impl TimelineAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Transition for a style. Only `Dynamic` consumes randomness.
    pub fn transition_for<R: Rng + ?Sized>(style: TransitionStyle, rng: &mut R) -> Transition {
        match style {
            TransitionStyle::Fast => Transition::new(TransitionKind::Cut, FAST_TRANSITION_SECS),
            TransitionStyle::Smooth => Transition::new(TransitionKind::Dissolve, SMOOTH_TRANSITION_SECS),
            TransitionStyle::Dynamic => {
                let kind = TransitionKind::ALL
                    .choose(rng)
                    .copied()
                    .unwrap_or(TransitionKind::Dissolve);
                Transition::new(kind, DYNAMIC_TRANSITION_SECS)
            }
            TransitionStyle::Default => {
                Transition::new(TransitionKind::Dissolve, DEFAULT_TRANSITION_SECS)
            }
        }
    }

    /// Assemble with the thread-local random source.
    pub fn assemble(&self, segments: &mut [ClipSegment], style: TransitionStyle) -> Timeline {
        self.assemble_with_rng(segments, style, &mut rand::rng())
    }

    /// Assemble a timeline.
    ///
    /// Clips are laid end to end. Each transition starts half its duration
    /// before the boundary so it overlaps both neighbours, and is also
    /// recorded on the outgoing segment.
    pub fn assemble_with_rng<R: Rng + ?Sized>(
        &self,
        segments: &mut [ClipSegment],
        style: TransitionStyle,
        rng: &mut R,
    ) -> Timeline {
        let mut events = Vec::with_capacity(segments.len().saturating_mul(2));
        let mut cursor = 0.0;
        let last = segments.len().saturating_sub(1);

        for (i, segment) in segments.iter_mut().enumerate() {
            segment.transitions.clear();
            events.push(TimelineEvent::Clip {
                start_time: cursor,
                duration: segment.duration,
                clip_id: segment.clip_id,
                source_start: segment.start_time,
                source_end: segment.end_time,
            });
            cursor += segment.duration;

            if i < last {
                let transition = Self::transition_for(style, rng);
                events.push(TimelineEvent::Transition {
                    start_time: cursor - transition.duration / 2.0,
                    duration: transition.duration,
                    transition: transition.clone(),
                });
                segment.transitions.push(transition);
            }
        }

        Timeline::new(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cstudio_models::ClipId;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn segments(durations: &[f64]) -> Vec<ClipSegment> {
        durations
            .iter()
            .enumerate()
            .map(|(i, d)| ClipSegment::new(ClipId(i as u64 + 1), 0.0, *d))
            .collect()
    }

    #[test]
    fn test_n_clips_get_n_minus_one_transitions() {
        let mut segs = segments(&[4.0, 3.0, 5.0]);
        let timeline = TimelineAssembler.assemble(&mut segs, TransitionStyle::Default);

        assert_eq!(timeline.clip_count(), 3);
        assert_eq!(timeline.transitions().count(), 2);
        assert!(timeline.events.first().is_some_and(|e| e.is_clip()));
        assert!(timeline.events.last().is_some_and(|e| e.is_clip()));
        assert_eq!(segs[0].transitions.len(), 1);
        assert!(segs[2].transitions.is_empty());
    }

    #[test]
    fn test_transition_straddles_boundary() {
        let mut segs = segments(&[4.0, 6.0]);
        let timeline = TimelineAssembler.assemble(&mut segs, TransitionStyle::Smooth);

        let transition = &timeline.events[1];
        assert_eq!(transition.start_time(), 3.5);
        assert_eq!(transition.duration(), 1.0);
        assert_eq!(timeline.events[2].start_time(), 4.0);
        assert_eq!(timeline.total_duration, 10.0);
    }

    #[test]
    fn test_style_policy() {
        let mut rng = StdRng::seed_from_u64(7);
        let fast = TimelineAssembler::transition_for(TransitionStyle::Fast, &mut rng);
        assert_eq!((fast.kind, fast.duration), (TransitionKind::Cut, 0.1));

        let default = TimelineAssembler::transition_for(TransitionStyle::Default, &mut rng);
        assert_eq!((default.kind, default.duration), (TransitionKind::Dissolve, 0.5));
        assert_eq!(default.easing, "ease-in-out");

        let dynamic = TimelineAssembler::transition_for(TransitionStyle::Dynamic, &mut rng);
        assert_eq!(dynamic.duration, 0.3);
        assert!(TransitionKind::ALL.contains(&dynamic.kind));
    }

    #[test]
    fn test_dynamic_is_reproducible_with_seed() {
        let run = |seed| {
            let mut segs = segments(&[2.0; 6]);
            TimelineAssembler.assemble_with_rng(
                &mut segs,
                TransitionStyle::Dynamic,
                &mut StdRng::seed_from_u64(seed),
            )
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_single_and_empty() {
        let mut segs = segments(&[5.0]);
        let timeline = TimelineAssembler.assemble(&mut segs, TransitionStyle::Fast);
        assert_eq!(timeline.events.len(), 1);
        assert_eq!(timeline.total_duration, 5.0);

        let timeline = TimelineAssembler.assemble(&mut [], TransitionStyle::Fast);
        assert!(timeline.is_empty());
        assert_eq!(timeline.total_duration, 0.0);
    }
}
