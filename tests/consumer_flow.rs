//! End-to-end consumer behavior over the in-process broker.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use smoker_sentinel::{
    broker::{Broker, Delivery, MemoryBroker, MemorySource, MessageSource},
    notify::Notifier,
    AlertEvaluator, BrokerError, Consumer, ConsumerState, NotifyError, RuleSettings, Signal,
    Stopped,
};

const SMOKER: &str = "01-smoker";
const FOOD_B: &str = "03-food-B";

// ---

/// Records every (subject, body) it is asked to send.
#[derive(Clone, Default)]
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn kind(&self) -> &str {
        "recording"
    }

    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    fn kind(&self) -> &str {
        "failing"
    }

    async fn notify(&self, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Smtp("relay unreachable".into()))
    }
}

struct HangingNotifier;

#[async_trait]
impl Notifier for HangingNotifier {
    fn kind(&self) -> &str {
        "hanging"
    }

    async fn notify(&self, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Wraps a source and drops the first ack on the floor with an error, as if
/// the connection died between processing and acknowledging.
struct LostFirstAck {
    inner: MemorySource,
    lost: bool,
}

#[async_trait]
impl MessageSource for LostFirstAck {
    fn queue(&self) -> &str {
        self.inner.queue()
    }

    async fn recv(&mut self) -> Option<Result<Delivery, BrokerError>> {
        self.inner.recv().await
    }

    async fn ack(&mut self, tag: u64) -> Result<(), BrokerError> {
        if !self.lost {
            self.lost = true;
            return Err(BrokerError::Ack {
                tag,
                reason: "connection reset".into(),
            });
        }
        self.inner.ack(tag).await
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.inner.close().await
    }
}

fn consumer_for(signal: Signal, notifier: Arc<dyn Notifier>) -> Consumer {
    let evaluator = AlertEvaluator::from_settings(&RuleSettings::defaults(signal));
    Consumer::new(evaluator, notifier, Duration::from_secs(5))
}

fn buffered(consumer: &Consumer) -> Vec<f64> {
    consumer
        .evaluator()
        .buffer()
        .snapshot()
        .iter()
        .map(|s| s.temperature)
        .collect()
}

async fn drain(consumer: &mut Consumer, broker: &MemoryBroker, queue: &str) -> Stopped {
    broker.close_queue(queue);
    let mut source = consumer.subscribe(broker.clone(), queue).await.unwrap();
    consumer
        .run(&mut source, std::future::pending())
        .await
        .unwrap()
}

// ---

#[tokio::test]
async fn smoker_sequence_with_gap_alerts_on_t3() {
    // ---
    let broker = MemoryBroker::new();
    broker.publish(SMOKER, "t1,90");
    broker.publish(SMOKER, "t2,No temperature");
    broker.publish(SMOKER, "t3,70");

    let notifier = RecordingNotifier::default();
    let mut consumer = consumer_for(Signal::Smoker, Arc::new(notifier.clone()));
    assert_eq!(drain(&mut consumer, &broker, SMOKER).await, Stopped::SourceClosed);

    assert_eq!(buffered(&consumer), vec![90.0, 70.0]);
    assert_eq!(broker.acked(SMOKER), vec!["t1,90", "t2,No temperature", "t3,70"]);
    assert_eq!(broker.in_flight_len(SMOKER), 0);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "Smoker Alert!");
    assert!(sent[0].1.starts_with("Smoker alert at t3!"), "body was {}", sent[0].1);

    let stats = consumer.stats();
    assert_eq!((stats.recorded, stats.skipped, stats.alerts), (2, 1, 1));
}

#[tokio::test]
async fn unparseable_messages_are_acknowledged_and_ignored() {
    // ---
    let broker = MemoryBroker::new();
    broker.publish(SMOKER, "garbage");
    broker.publish(SMOKER, "t1,hot");
    broker.publish(SMOKER, "t2,90,extra");
    broker.publish(SMOKER, vec![0xff, 0xfe]);
    broker.publish(SMOKER, "t3,No temperature");

    let notifier = RecordingNotifier::default();
    let mut consumer = consumer_for(Signal::Smoker, Arc::new(notifier.clone()));
    drain(&mut consumer, &broker, SMOKER).await;

    assert!(consumer.evaluator().buffer().is_empty());
    assert_eq!(broker.acked(SMOKER).len(), 5);
    assert_eq!(consumer.stats().rejected, 4);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn redelivery_after_lost_ack_inserts_the_reading_twice() {
    // ---
    let broker = MemoryBroker::new();
    broker.publish(SMOKER, "t1,90");

    let mut consumer = consumer_for(Signal::Smoker, Arc::new(RecordingNotifier::default()));
    let inner = consumer.subscribe(broker.clone(), SMOKER).await.unwrap();
    let mut source = LostFirstAck { inner, lost: false };

    let err = assert_err!(consumer.run(&mut source, std::future::pending()).await);
    assert!(matches!(err, BrokerError::Ack { .. }));
    assert_eq!(consumer.state(), ConsumerState::Closed);
    assert_eq!(consumer.evaluator().buffer().len(), 1);
    assert_eq!(broker.in_flight_len(SMOKER), 1);

    // The broker hands the unacked message back on reconnect. There is no
    // message identity to dedup on, so the buffer grows by one again.
    broker.reconnect(SMOKER);
    drain(&mut consumer, &broker, SMOKER).await;

    assert_eq!(buffered(&consumer), vec![90.0, 90.0]);
    assert_eq!(consumer.stats().redelivered, 1);
    assert_eq!(broker.acked(SMOKER), vec!["t1,90"]);
}

#[tokio::test]
async fn each_delivery_grows_the_buffer_by_one() {
    // ---
    let broker = MemoryBroker::new();
    for _ in 0..3 {
        broker.publish(SMOKER, "t1,225");
    }

    let mut consumer = consumer_for(Signal::Smoker, Arc::new(RecordingNotifier::default()));
    drain(&mut consumer, &broker, SMOKER).await;
    assert_eq!(consumer.evaluator().buffer().len(), 3);
}

#[tokio::test]
async fn buffer_stays_bounded_over_a_long_run() {
    // ---
    let broker = MemoryBroker::new();
    for i in 0..60 {
        let payload = if i % 7 == 3 {
            format!("t{i},No temperature")
        } else {
            format!("t{i},{}", 200 + i)
        };
        broker.publish(SMOKER, payload);
    }

    let mut consumer = consumer_for(Signal::Smoker, Arc::new(RecordingNotifier::default()));
    drain(&mut consumer, &broker, SMOKER).await;

    let snapshot = consumer.evaluator().buffer().snapshot();
    assert_eq!(snapshot.len(), 5);
    let stamps: Vec<&str> = snapshot.iter().map(|s| s.timestamp.as_str()).collect();
    assert_eq!(stamps, vec!["t54", "t55", "t56", "t57", "t58"]);
    assert_eq!(broker.acked(SMOKER).len(), 60);
}

#[tokio::test]
async fn food_stall_fires_on_tenth_flat_reading() {
    // ---
    let broker = MemoryBroker::new();
    let temps = [225.0, 226.0, 227.0, 226.5, 226.0, 225.5, 226.0, 225.8, 225.2, 225.5];
    for (i, t) in temps.iter().enumerate() {
        broker.publish(FOOD_B, format!("t{},{}", i + 1, t));
    }

    let notifier = RecordingNotifier::default();
    let mut consumer = consumer_for(Signal::FoodB, Arc::new(notifier.clone()));
    drain(&mut consumer, &broker, FOOD_B).await;

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "Food B Temperature Alert!");
    assert!(sent[0].1.starts_with("Food B stall alert at t10!"));
}

#[tokio::test]
async fn food_still_rising_does_not_stall() {
    // ---
    let broker = MemoryBroker::new();
    let temps = [225.0, 226.0, 227.0, 226.5, 226.0, 225.5, 226.0, 225.8, 225.2, 230.0];
    for (i, t) in temps.iter().enumerate() {
        broker.publish(FOOD_B, format!("t{},{}", i + 1, t));
    }

    let notifier = RecordingNotifier::default();
    let mut consumer = consumer_for(Signal::FoodB, Arc::new(notifier.clone()));
    drain(&mut consumer, &broker, FOOD_B).await;

    assert!(notifier.sent().is_empty());
    assert_eq!(consumer.evaluator().buffer().len(), 10);
}

#[tokio::test]
async fn failed_notification_is_logged_and_message_still_acked() {
    // ---
    let broker = MemoryBroker::new();
    broker.publish(SMOKER, "t1,250");
    broker.publish(SMOKER, "t2,200");
    broker.publish(SMOKER, "t3,201");

    let mut consumer = consumer_for(Signal::Smoker, Arc::new(FailingNotifier));
    drain(&mut consumer, &broker, SMOKER).await;

    assert_eq!(broker.acked(SMOKER).len(), 3);
    let stats = consumer.stats();
    assert_eq!(stats.alerts, 2);
    assert_eq!(stats.notify_failures, 2);
}

#[tokio::test(start_paused = true)]
async fn hanging_notifier_cannot_stall_the_queue() {
    // ---
    let broker = MemoryBroker::new();
    broker.publish(SMOKER, "t1,250");
    broker.publish(SMOKER, "t2,200");
    broker.publish(SMOKER, "t3,No temperature");

    let mut consumer = consumer_for(Signal::Smoker, Arc::new(HangingNotifier));
    drain(&mut consumer, &broker, SMOKER).await;

    assert_eq!(broker.acked(SMOKER).len(), 3);
    assert_eq!(consumer.stats().notify_failures, 1);
}

#[tokio::test]
async fn transport_failure_closes_and_reports_error() {
    // ---
    let broker = MemoryBroker::new();
    broker.publish(SMOKER, "t1,90");
    broker.fail_next_recv(SMOKER, "connection reset by peer");

    let mut consumer = consumer_for(Signal::Smoker, Arc::new(RecordingNotifier::default()));
    let mut source = consumer.subscribe(broker.clone(), SMOKER).await.unwrap();
    let result = consumer.run(&mut source, std::future::pending()).await;

    assert!(matches!(result, Err(BrokerError::Receive { .. })));
    assert_eq!(consumer.state(), ConsumerState::Closed);
    assert_eq!(broker.ready_len(SMOKER), 1);
}

#[tokio::test]
async fn interrupt_stops_between_messages() {
    // ---
    let broker = MemoryBroker::new();
    broker.publish(SMOKER, "t1,90");
    broker.publish(SMOKER, "t2,91");

    let watcher = broker.clone();
    let shutdown = async move {
        while watcher.acked(SMOKER).len() < 2 {
            tokio::task::yield_now().await;
        }
    };

    let mut consumer = consumer_for(Signal::Smoker, Arc::new(RecordingNotifier::default()));
    let mut source = consumer.subscribe(broker.clone(), SMOKER).await.unwrap();
    let stopped = assert_ok!(consumer.run(&mut source, shutdown).await);

    assert_eq!(stopped, Stopped::Interrupted);
    assert_eq!(consumer.state(), ConsumerState::Closed);
    assert_eq!(buffered(&consumer), vec![90.0, 91.0]);
}

#[tokio::test]
async fn signals_run_independently_in_one_process() {
    // ---
    let broker = MemoryBroker::new();
    broker.publish(SMOKER, "t1,90");
    broker.publish(FOOD_B, "t1,150");

    let mut smoker = consumer_for(Signal::Smoker, Arc::new(RecordingNotifier::default()));
    let mut food = consumer_for(Signal::FoodB, Arc::new(RecordingNotifier::default()));
    drain(&mut smoker, &broker, SMOKER).await;
    drain(&mut food, &broker, FOOD_B).await;

    assert_eq!(buffered(&smoker), vec![90.0]);
    assert_eq!(buffered(&food), vec![150.0]);
}

#[tokio::test]
async fn subscribe_is_idempotent_over_an_existing_queue() {
    // ---
    let broker = MemoryBroker::new();
    broker.publish(SMOKER, "t1,90");
    let first = assert_ok!(broker.clone().subscribe(SMOKER).await);
    drop(first);
    let mut second = assert_ok!(broker.clone().subscribe(SMOKER).await);
    let delivery = second.recv().await.unwrap().unwrap();
    assert_eq!(delivery.payload, b"t1,90");
}
