//! In-process broker with durable-queue semantics, for tests and local runs.
//!
//! Each queue hands out at most one unacknowledged delivery at a time
//! (prefetch 1). Unacked deliveries return to the head of the queue, marked
//! redelivered, when [`MemoryBroker::reconnect`] simulates a consumer
//! restart.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{Broker, Delivery, MessageSink, MessageSource};
use crate::error::BrokerError;

// ---

#[derive(Default)]
struct QueueState {
    // ---
    ready: VecDeque<(Vec<u8>, bool)>,
    in_flight: BTreeMap<u64, Vec<u8>>,
    acked: Vec<Vec<u8>>,
    next_tag: u64,
    closed: bool,
    fail_next_recv: Option<String>,
    wake: Arc<Notify>,
}

/// Shared handle; clones see the same queues.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    queues: Arc<Mutex<HashMap<String, QueueState>>>,
}

impl MemoryBroker {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, QueueState>> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_queue<R>(&self, queue: &str, f: impl FnOnce(&mut QueueState) -> R) -> R {
        let mut queues = self.lock();
        let state = queues.entry(queue.to_string()).or_default();
        let result = f(state);
        state.wake.notify_one();
        result
    }

    /// Enqueue a message, declaring the queue if needed.
    pub fn publish(&self, queue: &str, payload: impl Into<Vec<u8>>) {
        let payload = payload.into();
        self.with_queue(queue, |q| q.ready.push_back((payload, false)));
    }

    /// Return every unacknowledged delivery to the head of its queue, as a
    /// broker does when a consumer's connection drops.
    pub fn reconnect(&self, queue: &str) {
        // ---
        self.with_queue(queue, |q| {
            let in_flight = std::mem::take(&mut q.in_flight);
            for (_, payload) in in_flight.into_iter().rev() {
                q.ready.push_front((payload, true));
            }
            q.closed = false;
        });
    }

    /// End the subscription once the queue drains; `recv` then yields `None`.
    pub fn close_queue(&self, queue: &str) {
        self.with_queue(queue, |q| q.closed = true);
    }

    /// Make the next `recv` on `queue` fail with a transport error.
    pub fn fail_next_recv(&self, queue: &str, reason: &str) {
        let reason = reason.to_string();
        self.with_queue(queue, |q| q.fail_next_recv = Some(reason));
    }

    /// Payloads acknowledged so far, in ack order.
    pub fn acked(&self, queue: &str) -> Vec<String> {
        self.with_queue(queue, |q| {
            q.acked
                .iter()
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .collect()
        })
    }

    /// Messages waiting to be delivered.
    pub fn ready_len(&self, queue: &str) -> usize {
        self.with_queue(queue, |q| q.ready.len())
    }

    /// Deliveries handed out but not acknowledged.
    pub fn in_flight_len(&self, queue: &str) -> usize {
        self.with_queue(queue, |q| q.in_flight.len())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    type Source = MemorySource;

    async fn subscribe(self, queue: &str) -> Result<MemorySource, BrokerError> {
        let wake = self.with_queue(queue, |q| q.wake.clone());
        Ok(MemorySource {
            broker: self,
            queue: queue.to_string(),
            wake,
            open: true,
        })
    }
}

#[async_trait]
impl MessageSink for MemoryBroker {
    async fn reset_queue(&mut self, queue: &str) -> Result<(), BrokerError> {
        self.with_queue(queue, |q| {
            q.ready.clear();
            q.in_flight.clear();
            q.acked.clear();
            q.closed = false;
        });
        Ok(())
    }

    async fn publish(&mut self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        MemoryBroker::publish(self, queue, payload.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Subscription on one [`MemoryBroker`] queue.
pub struct MemorySource {
    // ---
    broker: MemoryBroker,
    queue: String,
    wake: Arc<Notify>,
    open: bool,
}

enum Poll {
    Ready(Delivery),
    Failed(String),
    Ended,
    Wait,
}

impl MemorySource {
    fn poll(&self) -> Poll {
        // ---
        let mut queues = self.broker.lock();
        let q = queues.entry(self.queue.clone()).or_default();

        if let Some(reason) = q.fail_next_recv.take() {
            return Poll::Failed(reason);
        }
        if !q.in_flight.is_empty() {
            return if q.closed { Poll::Ended } else { Poll::Wait };
        }
        match q.ready.pop_front() {
            Some((payload, redelivered)) => {
                q.next_tag += 1;
                let tag = q.next_tag;
                q.in_flight.insert(tag, payload.clone());
                Poll::Ready(Delivery {
                    tag,
                    payload,
                    redelivered,
                })
            }
            None if q.closed => Poll::Ended,
            None => Poll::Wait,
        }
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn recv(&mut self) -> Option<Result<Delivery, BrokerError>> {
        // ---
        loop {
            if !self.open {
                return None;
            }
            match self.poll() {
                Poll::Ready(delivery) => return Some(Ok(delivery)),
                Poll::Failed(reason) => {
                    return Some(Err(BrokerError::Receive {
                        queue: self.queue.clone(),
                        reason,
                    }))
                }
                Poll::Ended => return None,
                Poll::Wait => self.wake.notified().await,
            }
        }
    }

    async fn ack(&mut self, tag: u64) -> Result<(), BrokerError> {
        // ---
        let mut queues = self.broker.lock();
        let q = queues.entry(self.queue.clone()).or_default();
        match q.in_flight.remove(&tag) {
            Some(payload) => {
                q.acked.push(payload);
                q.wake.notify_one();
                Ok(())
            }
            None => Err(BrokerError::Ack {
                tag,
                reason: "unknown delivery tag".into(),
            }),
        }
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.open = false;
        Ok(())
    }
}
