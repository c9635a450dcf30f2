//! FFmpeg progress parsing.
//!
//! Two shapes are accepted:
//! - `-progress` blocks: one `key=value` per line, closed by `progress=continue|end`
//! - stats lines: several pairs on one line (`frame=  120 fps= 24 ... speed=1.0x`)
//!
//! Unknown keys and unparsable values are skipped.

use cstudio_models::{parse_timestamp, RenderProgress};

/// Incremental parser for one render's progress stream.
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    current: RenderProgress,
    total_duration: Option<f64>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expected output duration, used to derive `percent`.
    pub fn with_total_duration(mut self, seconds: f64) -> Self {
        self.total_duration = (seconds.is_finite() && seconds > 0.0).then_some(seconds);
        self
    }

    /// Feed one line. Returns a snapshot when the line completes an update.
    pub fn feed_line(&mut self, line: &str) -> Option<RenderProgress> {
        let normalized = squeeze_values(line.trim());
        let pairs: Vec<(&str, &str)> = normalized
            .split_whitespace()
            .filter_map(|token| token.split_once('='))
            .collect();

        match pairs.as_slice() {
            [] => None,
            [("progress", value)] => {
                if *value == "end" {
                    self.current.is_complete = true;
                }
                Some(self.snapshot())
            }
            [(key, value)] => {
                self.apply(key, value);
                None
            }
            _ => {
                for (key, value) in &pairs {
                    self.apply(key, value);
                }
                Some(self.snapshot())
            }
        }
    }

    /// Latest accumulated state.
    pub fn current(&self) -> &RenderProgress {
        &self.current
    }

    fn snapshot(&self) -> RenderProgress {
        let snapshot = self.current.clone();
        match self.total_duration {
            Some(total) => snapshot.with_total_duration(total),
            None => snapshot,
        }
    }

    fn apply(&mut self, key: &str, value: &str) {
        let value = value.trim();
        match key {
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.current.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.current.fps = fps;
                }
            }
            "time" | "out_time" => {
                // Negative clock values appear before the first frame.
                if let Ok(seconds) = parse_timestamp(value) {
                    self.current.elapsed_seconds = seconds;
                }
            }
            // out_time_ms is reported in microseconds as well.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    if us >= 0 {
                        self.current.elapsed_seconds = us as f64 / 1_000_000.0;
                    }
                }
            }
            "speed" => {
                if let Ok(speed) = value.trim_end_matches('x').trim().parse() {
                    self.current.speed = speed;
                }
            }
            "size" | "total_size" => {
                if let Some(size) = parse_size(value) {
                    self.current.size = size;
                }
            }
            "bitrate" => {
                if value != "N/A" && !value.is_empty() {
                    self.current.bitrate = Some(value.to_string());
                }
            }
            "progress" => {
                if value == "end" {
                    self.current.is_complete = true;
                }
            }
            _ => {}
        }
    }
}

/// Remove whitespace following `=` so padded stats values stay attached.
fn squeeze_values(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut after_eq = false;
    for ch in line.chars() {
        if after_eq && ch.is_whitespace() {
            continue;
        }
        after_eq = ch == '=';
        out.push(ch);
    }
    out
}

/// Parse `12345`, `256kB`, `2048KiB` or `3MiB` into bytes. Values that
/// overflow `u64` are ignored.
fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let (digits, multiplier) = if let Some(n) = value.strip_suffix("KiB").or_else(|| value.strip_suffix("kB")) {
        (n, 1024)
    } else if let Some(n) = value.strip_suffix("MiB").or_else(|| value.strip_suffix("MB")) {
        (n, 1024 * 1024)
    } else {
        (value, 1)
    };
    digits.trim().parse::<u64>().ok()?.checked_mul(multiplier)
}
