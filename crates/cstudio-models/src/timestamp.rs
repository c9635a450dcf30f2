//! Timestamp parsing for encoder clock values.
//!
//! Accepts `HH:MM:SS`, `HH:MM:SS.mmm`, `MM:SS` and plain seconds.

use thiserror::Error;

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'")]
    InvalidFormat(String),
}

/// Parse a timestamp string to total seconds.
///
/// # Examples
/// ```
/// use cstudio_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("00:00:05.00").unwrap(), 5.0);
/// assert_eq!(parse_timestamp("01:30").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }
    if ts.starts_with('-') {
        return Err(TimestampError::Negative);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let component = |name: &'static str, value: &str| -> Result<f64, TimestampError> {
        let parsed: f64 = value
            .parse()
            .map_err(|_| TimestampError::InvalidValue(name, value.to_string()))?;
        if parsed < 0.0 || !parsed.is_finite() {
            return Err(TimestampError::InvalidValue(name, value.to_string()));
        }
        Ok(parsed)
    };

    match parts.as_slice() {
        [secs] => component("seconds", secs),
        [mins, secs] => Ok(component("minutes", mins)? * 60.0 + component("seconds", secs)?),
        [hours, mins, secs] => Ok(component("hours", hours)? * 3600.0
            + component("minutes", mins)? * 60.0
            + component("seconds", secs)?),
        _ => Err(TimestampError::InvalidFormat(ts.to_string())),
    }
}

/// Format seconds as `HH:MM:SS.mmm`.
pub fn format_seconds(total_secs: f64) -> String {
    let total_secs = total_secs.max(0.0);
    let hours = (total_secs / 3600.0).floor() as u32;
    let mins = ((total_secs % 3600.0) / 60.0).floor() as u32;
    let secs = total_secs % 60.0;
    format!("{:02}:{:02}:{:06.3}", hours, mins, secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_encoder_clock() {
        assert_eq!(parse_timestamp("00:00:05.00").unwrap(), 5.0);
        assert_eq!(parse_timestamp("01:30:45").unwrap(), 5445.0);
        let value = parse_timestamp("00:01:02.500000").unwrap();
        assert!((value - 62.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_short_forms() {
        assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
        assert_eq!(parse_timestamp("90").unwrap(), 90.0);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_timestamp(""), Err(TimestampError::Empty));
        assert_eq!(parse_timestamp("-00:00:00.02"), Err(TimestampError::Negative));
        assert!(matches!(parse_timestamp("N/A"), Err(TimestampError::InvalidValue(_, _))));
        assert!(matches!(parse_timestamp("1:2:3:4"), Err(TimestampError::InvalidFormat(_))));
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0.0), "00:00:00.000");
        assert_eq!(format_seconds(3661.5), "01:01:01.500");
    }
}
