//! Alert rules evaluated over a signal's history buffer.
//!
//! A rule is a pure function of the buffer snapshot (the newly appended
//! sample is always the last element). It keeps no state of its own.

pub mod stall;
pub mod temperature_drop;

use std::time::Duration;

use crate::models::Sample;

pub use stall::StallRule;
pub use temperature_drop::TemperatureDropRule;

// ---

/// Result of evaluating a rule against a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    // ---
    /// `reason` is a short machine-friendly summary, `message` the alert body.
    Triggered { reason: String, message: String },
    NotTriggered,
}

impl Verdict {
    pub fn is_triggered(&self) -> bool {
        matches!(self, Verdict::Triggered { .. })
    }
}

/// A windowed anomaly check for one signal.
pub trait AlertRule: Send + Sync {
    /// Short rule identifier used in logs (e.g. `"temperature-drop"`).
    fn name(&self) -> &str;

    /// Evaluate the ordered window, oldest first.
    fn evaluate(&self, window: &[Sample]) -> Verdict;
}

/// Render a sample span as alert text, e.g. `"2.5 minutes"`.
pub(crate) fn describe_span(span: Duration) -> String {
    // ---
    let secs = span.as_secs();
    if secs < 60 {
        return format!("{secs} seconds");
    }
    if secs % 60 == 0 {
        let minutes = secs / 60;
        if minutes == 1 {
            "1 minute".to_string()
        } else {
            format!("{minutes} minutes")
        }
    } else {
        format!("{:.1} minutes", secs as f64 / 60.0)
    }
}

/// `"1 degree"` / `"15 degrees"`.
pub(crate) fn describe_degrees(threshold: f64) -> String {
    if (threshold - 1.0).abs() < f64::EPSILON {
        "1 degree".to_string()
    } else {
        format!("{threshold} degrees")
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_describe_span() {
        // ---
        assert_eq!(describe_span(Duration::from_secs(150)), "2.5 minutes");
        assert_eq!(describe_span(Duration::from_secs(300)), "5 minutes");
        assert_eq!(describe_span(Duration::from_secs(60)), "1 minute");
        assert_eq!(describe_span(Duration::from_secs(30)), "30 seconds");
    }

    #[test]
    fn test_describe_degrees() {
        // ---
        assert_eq!(describe_degrees(1.0), "1 degree");
        assert_eq!(describe_degrees(15.0), "15 degrees");
        assert_eq!(describe_degrees(0.5), "0.5 degrees");
    }
}
