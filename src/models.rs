//! Data models for the smoker alerting pipeline.
//!
//! A message on the wire is a single UTF-8 line, `"<timestamp>,<temperature>"`,
//! where the temperature field may be the literal sentinel [`NO_TEMPERATURE`].
//! Parsing turns that line into a [`Reading`]; only valid readings become
//! [`Sample`]s and enter a history buffer.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ParseError;

/// Literal stand-in for "no valid reading this cycle".
pub const NO_TEMPERATURE: &str = "No temperature";

// ---

/// The three monitored temperature channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    // ---
    Smoker,
    FoodA,
    FoodB,
}

impl Signal {
    // ---
    pub const ALL: [Signal; 3] = [Signal::Smoker, Signal::FoodA, Signal::FoodB];

    /// Queue the producer publishes this signal to by default.
    pub fn default_queue(self) -> &'static str {
        match self {
            Signal::Smoker => "01-smoker",
            Signal::FoodA => "02-food-A",
            Signal::FoodB => "03-food-B",
        }
    }

    /// Human readable name used in alert text.
    pub fn label(self) -> &'static str {
        match self {
            Signal::Smoker => "Smoker",
            Signal::FoodA => "Food A",
            Signal::FoodB => "Food B",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::Smoker => "smoker",
            Signal::FoodA => "food-a",
            Signal::FoodB => "food-b",
        };
        f.write_str(name)
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smoker" => Ok(Signal::Smoker),
            "food-a" | "food_a" | "fooda" => Ok(Signal::FoodA),
            "food-b" | "food_b" | "foodb" => Ok(Signal::FoodB),
            other => Err(format!(
                "unknown signal '{other}' (expected smoker, food-a or food-b)"
            )),
        }
    }
}

/// One parsed message. `temperature` is `None` when the producer sent the
/// sentinel; such a reading is acknowledged but never buffered.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    // ---
    pub timestamp: String,
    pub temperature: Option<f64>,
}

impl Reading {
    // ---
    pub fn valid(timestamp: impl Into<String>, temperature: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            temperature: Some(temperature),
        }
    }

    pub fn missing(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            temperature: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.temperature.is_some()
    }

    /// The bufferable form of this reading, if it carries a temperature.
    pub fn sample(&self) -> Option<Sample> {
        self.temperature.map(|temperature| Sample {
            timestamp: self.timestamp.clone(),
            temperature,
        })
    }

    /// Render the wire form consumed by [`parse_message`].
    pub fn encode(&self) -> String {
        match self.temperature {
            Some(t) => format!("{},{}", self.timestamp, t),
            None => format!("{},{}", self.timestamp, NO_TEMPERATURE),
        }
    }
}

/// A valid reading as held in a history buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    // ---
    pub timestamp: String,
    pub temperature: f64,
}

/// Parse a raw message payload into a [`Reading`].
///
/// The payload must be UTF-8 with exactly two comma-separated fields. The
/// temperature field is either [`NO_TEMPERATURE`] or a finite float;
/// surrounding whitespace is ignored.
pub fn parse_message(payload: &[u8]) -> Result<Reading, ParseError> {
    // ---
    let text = std::str::from_utf8(payload).map_err(|_| ParseError::NotUtf8)?;
    let text = text.trim_end_matches(['\r', '\n']);

    let fields: Vec<&str> = text.split(',').collect();
    let [timestamp, temperature] = fields.as_slice() else {
        return Err(ParseError::FieldCount(fields.len()));
    };

    let timestamp = timestamp.trim();
    let temperature = temperature.trim();

    if temperature == NO_TEMPERATURE {
        return Ok(Reading::missing(timestamp));
    }

    let value: f64 = temperature
        .parse()
        .map_err(|_| ParseError::Temperature(temperature.to_string()))?;
    if !value.is_finite() {
        return Err(ParseError::Temperature(temperature.to_string()));
    }

    Ok(Reading::valid(timestamp, value))
}

/// Alert produced by a triggered rule and handed to a notifier.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    // ---
    pub id: Uuid,
    pub signal: Signal,
    /// Timestamp of the reading that triggered the alert, as sent on the wire.
    pub timestamp: String,
    pub reason: String,
    pub subject: String,
    pub body: String,
    pub raised_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_parse_valid_reading() {
        // ---
        let reading = parse_message(b"03/07/24 14:06:00,225.5").unwrap();
        assert_eq!(reading.timestamp, "03/07/24 14:06:00");
        assert_eq!(reading.temperature, Some(225.5));
        assert!(reading.is_valid());
    }

    #[test]
    fn test_parse_sentinel_is_invalid_not_error() {
        // ---
        let reading = parse_message(b"t2,No temperature").unwrap();
        assert_eq!(reading, Reading::missing("t2"));
        assert!(!reading.is_valid());
        assert!(reading.sample().is_none());
    }

    #[test]
    fn test_parse_tolerates_whitespace_and_newline() {
        // ---
        let reading = parse_message(b"t1, 90 \n").unwrap();
        assert_eq!(reading.temperature, Some(90.0));
    }

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        // ---
        assert_eq!(parse_message(b"t1"), Err(ParseError::FieldCount(1)));
        assert_eq!(parse_message(b"t1,90,91"), Err(ParseError::FieldCount(3)));
    }

    #[test]
    fn test_parse_rejects_bad_temperature() {
        // ---
        assert!(matches!(
            parse_message(b"t1,hot"),
            Err(ParseError::Temperature(v)) if v == "hot"
        ));
        assert!(parse_message(b"t1,").is_err());
        assert!(parse_message(b"t1,NaN").is_err());
        assert!(parse_message(b"t1,inf").is_err());
    }

    #[test]
    fn test_parse_rejects_non_utf8() {
        // ---
        assert_eq!(parse_message(&[0xff, 0xfe, b',']), Err(ParseError::NotUtf8));
    }

    #[test]
    fn test_encode_matches_wire_format() {
        // ---
        assert_eq!(Reading::valid("t1", 90.5).encode(), "t1,90.5");
        assert_eq!(Reading::missing("t2").encode(), "t2,No temperature");
        assert_eq!(parse_message(Reading::valid("t3", 70.0).encode().as_bytes()).unwrap().temperature, Some(70.0));
    }

    #[test]
    fn test_signal_names() {
        // ---
        assert_eq!("food-b".parse::<Signal>().unwrap(), Signal::FoodB);
        assert_eq!("Smoker".parse::<Signal>().unwrap(), Signal::Smoker);
        assert!("oven".parse::<Signal>().is_err());
        assert_eq!(Signal::FoodA.default_queue(), "02-food-A");
        assert_eq!(Signal::FoodB.to_string(), "food-b");
    }
}
