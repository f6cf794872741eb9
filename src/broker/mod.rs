//! Message broker seam.
//!
//! The consumer loop only needs to receive deliveries one at a time and
//! acknowledge them by tag; the producer only needs to (re)declare durable
//! queues and publish to them through the default exchange. Both sides are
//! traits so the loop runs unchanged over AMQP or the in-process
//! [`MemoryBroker`].

pub mod amqp;
pub mod memory;

use async_trait::async_trait;

use crate::error::BrokerError;

pub use amqp::{AmqpBroker, AmqpSink, AmqpSource};
pub use memory::{MemoryBroker, MemorySource};

// ---

/// One message handed to the consumer. Must be acknowledged by `tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    // ---
    pub tag: u64,
    pub payload: Vec<u8>,
    /// Set when the broker has delivered this message before without an ack.
    pub redelivered: bool,
}

/// A connected broker that can hand out a subscription.
#[async_trait]
pub trait Broker: Send + Sized {
    type Source: MessageSource;

    /// Declare `queue` as durable, limit in-flight deliveries to one and
    /// start consuming with explicit acknowledgments.
    ///
    /// On failure the underlying connection is closed before returning.
    async fn subscribe(self, queue: &str) -> Result<Self::Source, BrokerError>;
}

/// Receiving side of a subscription.
#[async_trait]
pub trait MessageSource: Send {
    fn queue(&self) -> &str;

    /// Wait for the next delivery. `None` means the broker ended the
    /// subscription.
    async fn recv(&mut self) -> Option<Result<Delivery, BrokerError>>;

    /// Positively acknowledge a delivery.
    async fn ack(&mut self, tag: u64) -> Result<(), BrokerError>;

    /// Stop consuming and close the transport.
    async fn close(&mut self) -> Result<(), BrokerError>;
}

/// Publishing side used by the producer.
#[async_trait]
pub trait MessageSink: Send {
    /// Delete `queue` if present and declare it again as durable.
    async fn reset_queue(&mut self, queue: &str) -> Result<(), BrokerError>;

    /// Publish a persistent message to `queue` via the default exchange.
    async fn publish(&mut self, queue: &str, payload: &[u8]) -> Result<(), BrokerError>;

    async fn close(&mut self) -> Result<(), BrokerError>;
}

/// Where and how to reach the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    // ---
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5672,
            user: "guest".into(),
            password: "guest".into(),
            vhost: "/".into(),
        }
    }
}

impl BrokerSettings {
    // ---
    /// AMQP URI for this broker.
    pub fn uri(&self) -> String {
        self.render(&self.password)
    }

    /// AMQP URI with the password replaced by `****`, for logs.
    pub fn masked_uri(&self) -> String {
        self.render("****")
    }

    fn render(&self, password: &str) -> String {
        let vhost = if self.vhost == "/" {
            "%2f".to_string()
        } else {
            self.vhost.trim_start_matches('/').to_string()
        };
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.user, password, self.host, self.port, vhost
        )
    }
}
