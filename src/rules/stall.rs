use std::time::Duration;

use super::{describe_degrees, describe_span, AlertRule, Verdict};
use crate::models::{Sample, Signal};

/// Fires when the temperature moved less than `threshold` degrees across the
/// last `evaluation_window` samples (a cooking plateau).
///
/// The evaluation window is independent of how much history the buffer
/// retains; with fewer samples than the window the rule stays quiet.
///
/// The rule has no memory of earlier verdicts: a plateau that lasts keeps
/// firing on every reading once the window is full, so a notifier sees one
/// alert per producer cycle until the temperature moves again.
#[derive(Debug, Clone)]
pub struct StallRule {
    // ---
    pub signal: Signal,
    pub threshold: f64,
    pub evaluation_window: usize,
    /// Wall-clock span of `evaluation_window` samples.
    pub span: Duration,
}

impl StallRule {
    // ---
    pub fn new(signal: Signal, threshold: f64, evaluation_window: usize, span: Duration) -> Self {
        Self {
            signal,
            threshold,
            evaluation_window: evaluation_window.max(2),
            span,
        }
    }
}

impl AlertRule for StallRule {
    fn name(&self) -> &str {
        "stall"
    }

    fn evaluate(&self, window: &[Sample]) -> Verdict {
        // ---
        if window.len() < self.evaluation_window {
            return Verdict::NotTriggered;
        }
        let recent = &window[window.len() - self.evaluation_window..];
        let (Some(oldest), Some(newest)) = (recent.first(), recent.last()) else {
            return Verdict::NotTriggered;
        };

        let difference = newest.temperature - oldest.temperature;
        if difference.abs() < self.threshold {
            let label = self.signal.label();
            Verdict::Triggered {
                reason: format!(
                    "changed {difference:.2} degrees over {} samples (threshold {})",
                    self.evaluation_window, self.threshold
                ),
                message: format!(
                    "{label} stall alert at {}! The temperature of {label} has changed less than {} in {}.",
                    newest.timestamp,
                    describe_degrees(self.threshold),
                    describe_span(self.span),
                ),
            }
        } else {
            Verdict::NotTriggered
        }
    }
}
