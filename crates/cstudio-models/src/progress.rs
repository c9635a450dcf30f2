//! Render progress snapshots reported by the encoder.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One progress report parsed from encoder output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderProgress {
    /// Frames encoded so far
    pub frame: u64,
    /// Current encoding speed in frames per second
    pub fps: f64,
    /// Output time encoded so far (seconds)
    pub elapsed_seconds: f64,
    /// Speed relative to realtime (1.0 = realtime)
    pub speed: f64,
    /// Output size in bytes
    pub size: u64,
    /// Current bitrate as reported ("1200.5kbits/s")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,
    /// Percentage of the expected duration, when the duration is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    /// Set on the final `progress=end` report
    #[serde(default)]
    pub is_complete: bool,
}

impl RenderProgress {
    /// Fill `percent` from the expected output duration. Clamped to 100;
    /// left empty when the duration is unknown.
    pub fn with_total_duration(mut self, total_seconds: f64) -> Self {
        self.percent = if total_seconds > 0.0 && total_seconds.is_finite() {
            Some((self.elapsed_seconds / total_seconds * 100.0).clamp(0.0, 100.0))
        } else {
            None
        };
        self
    }

    /// Estimated seconds remaining, when speed and duration allow it.
    pub fn eta_seconds(&self, total_seconds: f64) -> Option<f64> {
        if self.speed <= 0.0 || total_seconds <= 0.0 {
            return None;
        }
        let remaining = (total_seconds - self.elapsed_seconds).max(0.0);
        Some(remaining / self.speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_is_clamped() {
        let progress = RenderProgress {
            elapsed_seconds: 12.0,
            ..Default::default()
        };
        assert_eq!(progress.clone().with_total_duration(10.0).percent, Some(100.0));
        assert_eq!(progress.clone().with_total_duration(24.0).percent, Some(50.0));
        assert_eq!(progress.with_total_duration(0.0).percent, None);
    }

    #[test]
    fn test_eta() {
        let progress = RenderProgress {
            elapsed_seconds: 10.0,
            speed: 2.0,
            ..Default::default()
        };
        assert_eq!(progress.eta_seconds(30.0), Some(10.0));
        assert_eq!(progress.eta_seconds(0.0), None);
    }
}
