//! Timeline events with absolute timing.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ClipId, Transition};

/// A placed entry on the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEvent {
    /// A clip segment placed on the timeline
    Clip {
        start_time: f64,
        duration: f64,
        clip_id: ClipId,
        /// Trim window within the source clip
        source_start: f64,
        source_end: f64,
    },
    /// A transition straddling the boundary between two clips
    Transition {
        start_time: f64,
        duration: f64,
        transition: Transition,
    },
    /// A named effect applied over a time range
    Effect {
        start_time: f64,
        duration: f64,
        name: String,
        #[serde(default)]
        parameters: BTreeMap<String, serde_json::Value>,
    },
}

impl TimelineEvent {
    pub fn start_time(&self) -> f64 {
        match self {
            TimelineEvent::Clip { start_time, .. }
            | TimelineEvent::Transition { start_time, .. }
            | TimelineEvent::Effect { start_time, .. } => *start_time,
        }
    }

    pub fn duration(&self) -> f64 {
        match self {
            TimelineEvent::Clip { duration, .. }
            | TimelineEvent::Transition { duration, .. }
            | TimelineEvent::Effect { duration, .. } => *duration,
        }
    }

    pub fn end_time(&self) -> f64 {
        self.start_time() + self.duration()
    }

    pub fn is_clip(&self) -> bool {
        matches!(self, TimelineEvent::Clip { .. })
    }

    pub fn is_transition(&self) -> bool {
        matches!(self, TimelineEvent::Transition { .. })
    }
}

/// Ordered timeline produced by the assembler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Timeline {
    pub events: Vec<TimelineEvent>,
    /// Maximum event end time
    pub total_duration: f64,
}

impl Timeline {
    /// Build a timeline, deriving the total duration from the events.
    pub fn new(events: Vec<TimelineEvent>) -> Self {
        let total_duration = events
            .iter()
            .map(TimelineEvent::end_time)
            .fold(0.0_f64, f64::max);
        Self {
            events,
            total_duration,
        }
    }

    pub fn clips(&self) -> impl Iterator<Item = &TimelineEvent> {
        self.events.iter().filter(|e| e.is_clip())
    }

    pub fn transitions(&self) -> impl Iterator<Item = &TimelineEvent> {
        self.events.iter().filter(|e| e.is_transition())
    }

    pub fn clip_count(&self) -> usize {
        self.clips().count()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransitionKind;

    #[test]
    fn test_total_duration_is_max_end() {
        let timeline = Timeline::new(vec![
            TimelineEvent::Clip {
                start_time: 0.0,
                duration: 4.0,
                clip_id: ClipId(1),
                source_start: 0.0,
                source_end: 4.0,
            },
            TimelineEvent::Effect {
                start_time: 2.0,
                duration: 5.0,
                name: "vignette".into(),
                parameters: BTreeMap::new(),
            },
        ]);
        assert_eq!(timeline.total_duration, 7.0);
        assert_eq!(timeline.clip_count(), 1);
    }

    #[test]
    fn test_event_tagging() {
        let event = TimelineEvent::Transition {
            start_time: 3.75,
            duration: 0.5,
            transition: Transition::new(TransitionKind::Dissolve, 0.5),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "transition");
        assert_eq!(json["transition"]["type"], "dissolve");
    }
}
