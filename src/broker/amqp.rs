//! AMQP 0-9-1 transport over `lapin`.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        QueueDeclareOptions, QueueDeleteOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
};
use uuid::Uuid;

use super::{Broker, BrokerSettings, Delivery, MessageSink, MessageSource};
use crate::error::BrokerError;

/// Persistent delivery mode, so messages survive a broker restart along
/// with their durable queue.
const PERSISTENT: u8 = 2;

const CLOSE_OK: u16 = 200;

// ---

/// An open AMQP connection that has not subscribed yet.
pub struct AmqpBroker {
    // ---
    connection: Connection,
    host: String,
}

impl AmqpBroker {
    // ---
    pub async fn connect(settings: &BrokerSettings) -> Result<Self, BrokerError> {
        // ---
        let connection = Connection::connect(&settings.uri(), ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connect {
                host: settings.host.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(uri = %settings.masked_uri(), "AMQP connection established");

        Ok(Self {
            connection,
            host: settings.host.clone(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Open a channel for publishing. Consumes the connection so closing the
    /// sink closes the connection.
    pub async fn into_sink(self) -> Result<AmqpSink, BrokerError> {
        // ---
        match self.connection.create_channel().await {
            Ok(channel) => Ok(AmqpSink {
                connection: self.connection,
                channel,
            }),
            Err(e) => {
                let _ = self.connection.close(CLOSE_OK, "channel open failed").await;
                Err(BrokerError::Connect {
                    host: self.host,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn open_consumer(&self, queue: &str) -> Result<(Channel, Consumer), BrokerError> {
        // ---
        let subscribe_err = |e: lapin::Error| BrokerError::Subscribe {
            queue: queue.to_string(),
            reason: e.to_string(),
        };

        let channel = self.connection.create_channel().await.map_err(subscribe_err)?;
        declare_durable(&channel, queue).await?;

        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(subscribe_err)?;

        let consumer_tag = format!("smoker-sentinel-{}", Uuid::new_v4());
        let consumer = channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(subscribe_err)?;

        Ok((channel, consumer))
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    type Source = AmqpSource;

    async fn subscribe(self, queue: &str) -> Result<AmqpSource, BrokerError> {
        // ---
        match self.open_consumer(queue).await {
            Ok((channel, consumer)) => Ok(AmqpSource {
                connection: self.connection,
                channel,
                consumer,
                queue: queue.to_string(),
            }),
            Err(e) => {
                if let Err(close_err) = self.connection.close(CLOSE_OK, "subscribe failed").await {
                    tracing::warn!(error = %close_err, "Closing connection after failed subscribe");
                }
                Err(e)
            }
        }
    }
}

async fn declare_durable(channel: &Channel, queue: &str) -> Result<(), BrokerError> {
    // ---
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map(|_| ())
        .map_err(|e| BrokerError::Declare {
            queue: queue.to_string(),
            reason: e.to_string(),
        })
}

/// A live subscription on one durable queue with prefetch 1.
pub struct AmqpSource {
    // ---
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
    queue: String,
}

#[async_trait]
impl MessageSource for AmqpSource {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn recv(&mut self) -> Option<Result<Delivery, BrokerError>> {
        // ---
        let next = self.consumer.next().await?;
        Some(
            next.map(|d| Delivery {
                tag: d.delivery_tag,
                payload: d.data,
                redelivered: d.redelivered,
            })
            .map_err(|e| BrokerError::Receive {
                queue: self.queue.clone(),
                reason: e.to_string(),
            }),
        )
    }

    async fn ack(&mut self, tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(tag, BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Ack {
                tag,
                reason: e.to_string(),
            })
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        // ---
        // A channel the broker already closed is not worth reporting; the
        // connection close below is what matters.
        if let Err(e) = self.channel.close(CLOSE_OK, "consumer stopping").await {
            tracing::debug!(error = %e, "Channel close");
        }
        self.connection
            .close(CLOSE_OK, "consumer stopping")
            .await
            .map_err(|e| BrokerError::Close(e.to_string()))
    }
}

/// Publishing channel used by the producer.
pub struct AmqpSink {
    // ---
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl MessageSink for AmqpSink {
    async fn reset_queue(&mut self, queue: &str) -> Result<(), BrokerError> {
        // ---
        self.channel
            .queue_delete(queue, QueueDeleteOptions::default())
            .await
            .map_err(|e| BrokerError::Declare {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
        declare_durable(&self.channel, queue).await
    }

    async fn publish(&mut self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        // ---
        let publish_err = |e: lapin::Error| BrokerError::Publish {
            queue: queue.to_string(),
            reason: e.to_string(),
        };

        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(PERSISTENT),
            )
            .await
            .map_err(publish_err)?
            .await
            .map_err(publish_err)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        if let Err(e) = self.channel.close(CLOSE_OK, "producer done").await {
            tracing::debug!(error = %e, "Channel close");
        }
        self.connection
            .close(CLOSE_OK, "producer done")
            .await
            .map_err(|e| BrokerError::Close(e.to_string()))
    }
}
