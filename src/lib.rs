//! Windowed temperature alerting for a smart smoker.
//!
//! Readings for the smoker and two food probes arrive as
//! `"<timestamp>,<temperature>"` messages on durable queues. Each signal gets
//! its own [`AlertEvaluator`]: a bounded history buffer plus a rule (largest
//! drop for the smoker, stall detection for food). The [`Consumer`] drives an
//! evaluator from a prefetch-1 subscription, notifies on alerts, and
//! acknowledges each message only after it has been fully processed.
//!
//! Module boundaries follow the same gateway pattern as the binaries: `main.rs`
//! and `bin/producer.rs` only touch what is re-exported here.

pub mod broker;
pub mod buffer;
pub mod config;
pub mod consumer;
pub mod error;
pub mod evaluator;
pub mod logging;
pub mod models;
pub mod notify;
pub mod producer;
pub mod rules;

pub use buffer::HistoryBuffer;
pub use config::{Config, ProducerConfig};
pub use consumer::{Consumer, ConsumerState, ConsumerStats, Stopped};
pub use error::{BrokerError, NotifyError, ParseError};
pub use evaluator::{AlertEvaluator, Outcome, RuleSettings};
pub use models::{parse_message, AlertEvent, Reading, Sample, Signal, NO_TEMPERATURE};
