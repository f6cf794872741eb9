//! Typed errors for the library surface.
//!
//! The binaries fold these into `anyhow` at the edge; inside the crate each
//! concern keeps its own enum so the consumer loop can tell a bad payload
//! from a dead broker.

use std::time::Duration;

use thiserror::Error;

/// A message payload that cannot become a reading.
///
/// These are never retried: the consumer logs them and acknowledges the
/// delivery so a poison message cannot loop forever.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    // ---
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("expected 2 comma-separated fields, found {0}")]
    FieldCount(usize),

    #[error("invalid temperature '{0}'")]
    Temperature(String),
}

/// Transport-level failures talking to the message broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    // ---
    #[error("connection to broker at {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("declaring queue '{queue}' failed: {reason}")]
    Declare { queue: String, reason: String },

    #[error("subscribing to queue '{queue}' failed: {reason}")]
    Subscribe { queue: String, reason: String },

    #[error("receiving from queue '{queue}' failed: {reason}")]
    Receive { queue: String, reason: String },

    #[error("acknowledging delivery {tag} failed: {reason}")]
    Ack { tag: u64, reason: String },

    #[error("publishing to queue '{queue}' failed: {reason}")]
    Publish { queue: String, reason: String },

    #[error("closing connection failed: {0}")]
    Close(String),
}

/// Failures delivering an alert notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    // ---
    #[error("notifier configuration invalid: {0}")]
    InvalidConfig(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned status {0}")]
    Status(u16),

    #[error("notification timed out after {0:?}")]
    Timeout(Duration),
}
