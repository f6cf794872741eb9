use std::time::Duration;

use super::{describe_degrees, describe_span, AlertRule, Verdict};
use crate::models::{Sample, Signal};

/// Fires when any sample in the trailing `evaluation_window` is more than
/// `threshold` degrees above the latest one, i.e. the largest drop anywhere
/// in the window, not just between its endpoints.
#[derive(Debug, Clone)]
pub struct TemperatureDropRule {
    // ---
    pub signal: Signal,
    pub threshold: f64,
    pub evaluation_window: usize,
    /// Wall-clock span of `evaluation_window` samples.
    pub span: Duration,
}

impl TemperatureDropRule {
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

impl AlertRule for TemperatureDropRule {
    fn name(&self) -> &str {
        "temperature-drop"
    }

    fn evaluate(&self, window: &[Sample]) -> Verdict {
        // ---
        let start = window.len().saturating_sub(self.evaluation_window);
        let Some((latest, older)) = window[start..].split_last() else {
            return Verdict::NotTriggered;
        };

        let max_drop = older
            .iter()
            .map(|s| s.temperature - latest.temperature)
            .fold(f64::NEG_INFINITY, f64::max);

        if max_drop > self.threshold {
            let label = self.signal.label();
            Verdict::Triggered {
                reason: format!(
                    "dropped {max_drop:.1} degrees (threshold {})",
                    self.threshold
                ),
                message: format!(
                    "{label} alert at {}! The {} temperature has dropped more than {} in {}.",
                    latest.timestamp,
                    label.to_lowercase(),
                    describe_degrees(self.threshold),
                    describe_span(self.span),
                ),
            }
        } else {
            Verdict::NotTriggered
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn window(temps: &[f64]) -> Vec<Sample> {
        temps
            .iter()
            .enumerate()
            .map(|(i, &t)| Sample {
                timestamp: format!("t{}", i + 1),
                temperature: t,
            })
            .collect()
    }

    fn smoker_rule() -> TemperatureDropRule {
        TemperatureDropRule::new(Signal::Smoker, 15.0, 5, Duration::from_secs(150))
    }

    #[test]
    fn test_fires_on_drop_against_mid_window_point() {
        // ---
        // 82 - 65 = 17 > 15 even though the endpoints only differ by 15.
        let verdict = smoker_rule().evaluate(&window(&[80.0, 81.0, 82.0, 65.0]));
        match verdict {
            Verdict::Triggered { message, .. } => {
                assert_eq!(
                    message,
                    "Smoker alert at t4! The smoker temperature has dropped more than 15 degrees in 2.5 minutes."
                );
            }
            Verdict::NotTriggered => panic!("expected a drop alert"),
        }
    }

    #[test]
    fn test_small_drift_does_not_fire() {
        // ---
        let verdict = smoker_rule().evaluate(&window(&[80.0, 79.0, 78.0, 77.0]));
        assert_eq!(verdict, Verdict::NotTriggered);
    }

    #[test]
    fn test_exactly_threshold_does_not_fire() {
        // ---
        let verdict = smoker_rule().evaluate(&window(&[80.0, 65.0]));
        assert!(!verdict.is_triggered());
    }

    #[test]
    fn test_single_sample_never_fires() {
        // ---
        assert!(!smoker_rule().evaluate(&window(&[300.0])).is_triggered());
        assert!(!smoker_rule().evaluate(&[]).is_triggered());
    }

    #[test]
    fn test_drop_older_than_window_is_ignored() {
        // ---
        // 100 has slid out of the trailing five samples.
        let verdict = smoker_rule().evaluate(&window(&[100.0, 84.0, 84.0, 84.0, 84.0, 84.0]));
        assert!(!verdict.is_triggered());
    }

    #[test]
    fn test_rise_does_not_fire() {
        // ---
        let verdict = smoker_rule().evaluate(&window(&[60.0, 90.0]));
        assert!(!verdict.is_triggered());
    }
}
