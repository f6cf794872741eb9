//! The per-signal consumer loop.
//!
//! Lifecycle: `Disconnected → Connected → Subscribed → Consuming →
//! (Interrupted | Error) → Closed`. Deliveries are handled strictly one at a
//! time as a single unit of work: parse, buffer, evaluate, notify, then
//! acknowledge. The acknowledgment is always the last step, so an ack means
//! the message was fully processed; a crash before it leaves the message
//! for redelivery.
//!
//! Redelivery is not deduplicated. Messages carry no identity, so a message
//! that was processed but whose ack never reached the broker is appended to
//! the history buffer a second time when it comes back.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use tracing::{debug, error, info, warn};

use crate::{
    broker::{Broker, Delivery, MessageSource},
    error::BrokerError,
    evaluator::{AlertEvaluator, Outcome},
    notify::{dispatch, Notifier},
};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    // ---
    Disconnected,
    Connected,
    Subscribed,
    Consuming,
    Interrupted,
    Error,
    Closed,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a healthy consume loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stopped {
    // ---
    /// Operator asked for shutdown.
    Interrupted,
    /// The broker ended the subscription.
    SourceClosed,
}

/// Running counters, logged on shutdown.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    // ---
    pub received: u64,
    pub redelivered: u64,
    pub acked: u64,
    pub rejected: u64,
    pub skipped: u64,
    pub recorded: u64,
    pub alerts: u64,
    pub notify_failures: u64,
}

/// Drives one signal's evaluator from a broker subscription.
pub struct Consumer {
    // ---
    evaluator: AlertEvaluator,
    notifier: Arc<dyn Notifier>,
    notify_timeout: Duration,
    state: ConsumerState,
    stats: ConsumerStats,
}

impl Consumer {
    // ---
    pub fn new(
        evaluator: AlertEvaluator,
        notifier: Arc<dyn Notifier>,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            evaluator,
            notifier,
            notify_timeout,
            state: ConsumerState::Disconnected,
            stats: ConsumerStats::default(),
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    pub fn evaluator(&self) -> &AlertEvaluator {
        &self.evaluator
    }

    fn transition(&mut self, next: ConsumerState) {
        debug!(from = %self.state, to = %next, signal = %self.evaluator.signal(), "Consumer state");
        self.state = next;
    }

    /// Await a broker connection attempt. No retry: a failure is returned to
    /// the caller, which is expected to exit.
    pub async fn connect<B, F>(&mut self, host: &str, connect: F) -> Result<B, BrokerError>
    where
        F: Future<Output = Result<B, BrokerError>>,
    {
        // ---
        match connect.await {
            Ok(broker) => {
                info!(host = %host, "Connected to broker");
                self.transition(ConsumerState::Connected);
                Ok(broker)
            }
            Err(e) => {
                error!(host = %host, error = %e, "Connection to broker failed; verify the server is running");
                Err(e)
            }
        }
    }

    /// Declare the durable queue and start a prefetch-1 subscription.
    pub async fn subscribe<B: Broker>(
        &mut self,
        broker: B,
        queue: &str,
    ) -> Result<B::Source, BrokerError> {
        // ---
        match broker.subscribe(queue).await {
            Ok(source) => {
                info!(queue = %queue, rule = self.evaluator.rule_name(), "Subscribed");
                self.transition(ConsumerState::Subscribed);
                Ok(source)
            }
            Err(e) => {
                error!(queue = %queue, error = %e, "Subscribe failed");
                self.transition(ConsumerState::Error);
                self.transition(ConsumerState::Closed);
                Err(e)
            }
        }
    }

    /// Consume until `shutdown` resolves, the broker ends the subscription,
    /// or a transport error occurs. The source is closed on every path.
    pub async fn run<S, F>(&mut self, source: &mut S, shutdown: F) -> Result<Stopped, BrokerError>
    where
        S: MessageSource,
        F: Future<Output = ()>,
    {
        // ---
        self.transition(ConsumerState::Consuming);
        info!(queue = %source.queue(), "Ready for work");

        tokio::pin!(shutdown);
        let result = loop {
            // Shutdown is only observed between messages; a delivery in
            // progress always runs to its ack.
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => break Ok(Stopped::Interrupted),
                next = source.recv() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    if let Err(e) = self.handle(source, delivery).await {
                        break Err(e);
                    }
                }
                Some(Err(e)) => break Err(e),
                None => break Ok(Stopped::SourceClosed),
            }
        };

        match &result {
            Ok(Stopped::Interrupted) => {
                warn!(queue = %source.queue(), "Interrupted; stopping consumer");
                self.transition(ConsumerState::Interrupted);
            }
            Ok(Stopped::SourceClosed) => {
                error!(queue = %source.queue(), "Broker ended the subscription");
                self.transition(ConsumerState::Error);
            }
            Err(e) => {
                error!(queue = %source.queue(), error = %e, "Transport failure");
                self.transition(ConsumerState::Error);
            }
        }

        if let Err(e) = source.close().await {
            warn!(queue = %source.queue(), error = %e, "Closing connection failed");
        }
        self.transition(ConsumerState::Closed);
        info!(stats = ?self.stats, "Connection closed");

        result
    }

    /// Process one delivery and acknowledge it.
    ///
    /// Every delivery that reaches this point is acknowledged, including
    /// unparseable ones; only a failed ack is returned as an error.
    pub async fn handle<S: MessageSource>(
        &mut self,
        source: &mut S,
        delivery: Delivery,
    ) -> Result<Outcome, BrokerError> {
        // ---
        let payload = String::from_utf8_lossy(&delivery.payload).into_owned();
        self.stats.received += 1;
        if delivery.redelivered {
            self.stats.redelivered += 1;
            warn!(
                queue = %source.queue(),
                delivery_tag = delivery.tag,
                payload = %payload,
                "Redelivered message will be buffered again"
            );
        }
        debug!(queue = %source.queue(), delivery_tag = delivery.tag, payload = %payload, "Received");

        let outcome = self.evaluator.process(&delivery.payload);
        match &outcome {
            Outcome::Rejected(e) => {
                self.stats.rejected += 1;
                error!(
                    queue = %source.queue(),
                    delivery_tag = delivery.tag,
                    payload = %payload,
                    error = %e,
                    "Unprocessable message; acknowledging without evaluation"
                );
            }
            Outcome::Skipped(reading) => {
                self.stats.skipped += 1;
                debug!(timestamp = %reading.timestamp, "No temperature in reading; not buffered");
            }
            Outcome::Recorded { reading, alert } => {
                self.stats.recorded += 1;
                debug!(
                    timestamp = %reading.timestamp,
                    temperature = ?reading.temperature,
                    buffered = self.evaluator.buffer().len(),
                    "Reading buffered"
                );
                if let Some(alert) = alert {
                    self.stats.alerts += 1;
                    warn!(
                        signal = %alert.signal,
                        timestamp = %alert.timestamp,
                        reason = %alert.reason,
                        "{}",
                        alert.subject
                    );
                    if !dispatch(self.notifier.as_ref(), alert, self.notify_timeout).await {
                        self.stats.notify_failures += 1;
                    }
                }
            }
        }

        source.ack(delivery.tag).await?;
        self.stats.acked += 1;
        debug!(queue = %source.queue(), delivery_tag = delivery.tag, "Acknowledged");

        Ok(outcome)
    }
}
