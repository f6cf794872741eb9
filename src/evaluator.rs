//! Per-signal alert evaluator: parse, buffer, evaluate.
//!
//! An [`AlertEvaluator`] owns its history buffer and rule outright and is
//! handed to the consumer loop by the caller, so several signals can run side
//! by side in one process and tests can inspect the buffer afterwards.

use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    buffer::HistoryBuffer,
    error::ParseError,
    models::{parse_message, AlertEvent, Reading, Signal},
    rules::{AlertRule, StallRule, TemperatureDropRule, Verdict},
};

// ---

/// Upper bound on retained samples per signal.
pub const MAX_HISTORY_SIZE: usize = 10_000;

/// Upper bound on the producer cadence.
pub const MAX_CADENCE: Duration = Duration::from_secs(24 * 60 * 60);

/// Tuning for one signal's buffer and rule.
///
/// `history_size` is how many valid samples are retained;
/// `evaluation_window` is how many trailing samples the rule looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSettings {
    // ---
    pub signal: Signal,
    pub history_size: usize,
    pub evaluation_window: usize,
    pub threshold: f64,
    /// Producer cadence, used to describe window spans in alert text.
    pub cadence: Duration,
}

impl RuleSettings {
    // ---
    /// Defaults: smoker keeps 5 samples and alerts on a drop above 15
    /// degrees; food probes keep 20 samples and alert when the trailing 10
    /// move less than 1 degree.
    pub fn defaults(signal: Signal) -> Self {
        let cadence = Duration::from_secs(30);
        match signal {
            Signal::Smoker => Self {
                signal,
                history_size: 5,
                evaluation_window: 5,
                threshold: 15.0,
                cadence,
            },
            Signal::FoodA | Signal::FoodB => Self {
                signal,
                history_size: 20,
                evaluation_window: 10,
                threshold: 1.0,
                cadence,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        // ---
        if self.history_size < 1 {
            bail!("HISTORY_SIZE must be at least 1");
        }
        if self.history_size > MAX_HISTORY_SIZE {
            bail!("HISTORY_SIZE cannot exceed {MAX_HISTORY_SIZE}");
        }
        if self.evaluation_window < 2 {
            bail!("EVALUATION_WINDOW must be at least 2");
        }
        if self.evaluation_window > self.history_size {
            bail!(
                "EVALUATION_WINDOW ({}) cannot exceed HISTORY_SIZE ({})",
                self.evaluation_window,
                self.history_size
            );
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            bail!("ALERT_THRESHOLD must be a non-negative number");
        }
        if self.cadence.is_zero() {
            bail!("CADENCE_SECS must be at least 1");
        }
        if self.cadence > MAX_CADENCE {
            bail!("CADENCE_SECS cannot exceed {}", MAX_CADENCE.as_secs());
        }
        if self.span(self.evaluation_window).is_none() {
            bail!(
                "EVALUATION_WINDOW ({}) x CADENCE_SECS ({}) is out of range",
                self.evaluation_window,
                self.cadence.as_secs()
            );
        }
        Ok(())
    }

    /// Wall-clock span of `samples` consecutive readings, `None` on overflow.
    fn span(&self, samples: usize) -> Option<Duration> {
        let samples = u32::try_from(samples).ok()?;
        self.cadence.checked_mul(samples)
    }

    /// Span quoted in alert text; settings that skipped validation saturate.
    fn described_span(&self) -> Duration {
        self.span(self.evaluation_window).unwrap_or(Duration::MAX)
    }

    /// Build the rule this signal uses.
    pub fn build_rule(&self) -> Box<dyn AlertRule> {
        // ---
        match self.signal {
            Signal::Smoker => Box::new(TemperatureDropRule::new(
                self.signal,
                self.threshold,
                self.evaluation_window,
                self.described_span(),
            )),
            Signal::FoodA | Signal::FoodB => Box::new(StallRule::new(
                self.signal,
                self.threshold,
                self.evaluation_window,
                self.described_span(),
            )),
        }
    }
}

/// What happened to one message.
#[derive(Debug, Clone)]
pub enum Outcome {
    // ---
    /// Unparseable payload; acknowledged and dropped.
    Rejected(ParseError),
    /// Sentinel reading; acknowledged, never buffered.
    Skipped(Reading),
    /// Valid reading appended to the buffer and evaluated.
    Recorded {
        reading: Reading,
        alert: Option<AlertEvent>,
    },
}

impl Outcome {
    pub fn alert(&self) -> Option<&AlertEvent> {
        match self {
            Outcome::Recorded { alert, .. } => alert.as_ref(),
            _ => None,
        }
    }
}

/// Buffer plus rule for one monitored signal.
pub struct AlertEvaluator {
    // ---
    signal: Signal,
    buffer: HistoryBuffer,
    rule: Box<dyn AlertRule>,
}

impl AlertEvaluator {
    // ---
    pub fn new(signal: Signal, history_size: usize, rule: Box<dyn AlertRule>) -> Self {
        Self {
            signal,
            buffer: HistoryBuffer::new(history_size),
            rule,
        }
    }

    pub fn from_settings(settings: &RuleSettings) -> Self {
        Self::new(settings.signal, settings.history_size, settings.build_rule())
    }

    /// Parse a raw payload and feed it through [`observe`](Self::observe).
    pub fn process(&mut self, payload: &[u8]) -> Outcome {
        // ---
        match parse_message(payload) {
            Ok(reading) => self.observe(reading),
            Err(e) => Outcome::Rejected(e),
        }
    }

    /// Append a valid reading and evaluate the rule over the new snapshot.
    pub fn observe(&mut self, reading: Reading) -> Outcome {
        // ---
        let Some(sample) = reading.sample() else {
            return Outcome::Skipped(reading);
        };
        self.buffer.append(sample);

        let alert = match self.rule.evaluate(self.buffer.snapshot()) {
            Verdict::Triggered { reason, message } => Some(AlertEvent {
                id: Uuid::new_v4(),
                signal: self.signal,
                timestamp: reading.timestamp.clone(),
                reason,
                subject: alert_subject(self.signal),
                body: message,
                raised_at: Utc::now(),
            }),
            Verdict::NotTriggered => None,
        };

        Outcome::Recorded { reading, alert }
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    pub fn rule_name(&self) -> &str {
        self.rule.name()
    }

    pub fn buffer(&self) -> &HistoryBuffer {
        &self.buffer
    }
}

fn alert_subject(signal: Signal) -> String {
    match signal {
        Signal::Smoker => "Smoker Alert!".to_string(),
        other => format!("{} Temperature Alert!", other.label()),
    }
}
