use crate::delivery::{Delivery, DeliveryProcessor, Disposition};
use crate::{ConsumerError, DEFAULT_TOPIC};
use futures::StreamExt;
use parksync_runtime::metrics::DeliveryMetrics;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use std::future::Future;
use std::time::Duration;

impl Delivery {
    fn from_message(message: &BorrowedMessage<'_>) -> Self {
        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message
                .key()
                .map(|key| String::from_utf8_lossy(key).into_owned()),
            payload: message.payload().map(<[u8]>::to_vec),
        }
    }
}

/// Kafka consumer for parking lifecycle events.
///
/// Processes messages one at a time and commits each offset only once the
/// message reached a final [`Disposition`].
pub struct ParkingEventConsumer {
    consumer: StreamConsumer,
    topic: String,
    consumer_group: String,
}

impl ParkingEventConsumer {
    /// Create a builder for configuring the consumer.
    #[must_use]
    pub fn builder() -> ParkingEventConsumerBuilder {
        ParkingEventConsumerBuilder::default()
    }

    /// Subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Consumer group id.
    #[must_use]
    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    /// Consume until `shutdown` completes or the stream ends.
    ///
    /// An event already being processed when `shutdown` fires is finished and
    /// committed before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::DeadLetter`] if an event could not be
    /// dead-lettered. Its offset is left uncommitted so it is redelivered after
    /// a restart.
    pub async fn run<S>(&self, processor: &DeliveryProcessor, shutdown: S) -> Result<(), ConsumerError>
    where
        S: Future<Output = ()>,
    {
        let mut stream = self.consumer.stream();
        tokio::pin!(shutdown);

        tracing::info!(
            topic = %self.topic,
            consumer_group = %self.consumer_group,
            "Parking event consumer started"
        );

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping consumer");
                    break;
                }
                next = stream.next() => {
                    let Some(result) = next else {
                        tracing::debug!("Consumer stream ended");
                        break;
                    };

                    let message = match result {
                        Ok(message) => message,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to receive message");
                            continue;
                        },
                    };

                    let delivery = Delivery::from_message(&message);
                    let disposition = processor.process(&delivery).await?;
                    if let Disposition::DeadLettered { reason, .. } = &disposition {
                        tracing::debug!(
                            partition = delivery.partition,
                            offset = delivery.offset,
                            reason = reason.label(),
                            "Committing dead-lettered message"
                        );
                    }

                    if let Err(e) = self.consumer.commit_message(&message, CommitMode::Async) {
                        tracing::warn!(
                            topic = message.topic(),
                            partition = message.partition(),
                            offset = message.offset(),
                            error = %e,
                            "Failed to commit offset (message may be redelivered)"
                        );
                    } else {
                        DeliveryMetrics::record_commit();
                    }
                }
            }
        }

        tracing::info!("Parking event consumer stopped");
        Ok(())
    }
}

/// Builder for [`ParkingEventConsumer`].
#[derive(Debug, Default)]
pub struct ParkingEventConsumerBuilder {
    brokers: Option<String>,
    consumer_group: Option<String>,
    topic: Option<String>,
    auto_offset_reset: Option<String>,
    session_timeout: Option<Duration>,
}

impl ParkingEventConsumerBuilder {
    /// Set bootstrap servers (comma-separated). Required.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the consumer group (default: `parking-service`).
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set the topic (default: `parking.events`).
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Where a new consumer group starts reading (default: `earliest`).
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Group session timeout (default: 6 seconds).
    #[must_use]
    pub const fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Create the consumer and subscribe to the topic.
    ///
    /// # Errors
    ///
    /// - [`ConsumerError::Config`] if brokers are not set
    /// - [`ConsumerError::ConnectionFailed`] if the client cannot be created
    /// - [`ConsumerError::SubscriptionFailed`] if subscribing fails
    pub fn build(self) -> Result<ParkingEventConsumer, ConsumerError> {
        let brokers = self
            .brokers
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| ConsumerError::Config("Brokers not configured".to_string()))?;
        let consumer_group = self
            .consumer_group
            .unwrap_or_else(|| "parking-service".to_string());
        let topic = self.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string());
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "earliest".to_string());
        let session_timeout = self.session_timeout.unwrap_or(Duration::from_secs(6));

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", &consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &auto_offset_reset)
            .set("session.timeout.ms", session_timeout.as_millis().to_string())
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| ConsumerError::ConnectionFailed(e.to_string()))?;

        consumer
            .subscribe(&[topic.as_str()])
            .map_err(|e| ConsumerError::SubscriptionFailed {
                topic: topic.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            brokers = %brokers,
            topic = %topic,
            consumer_group = %consumer_group,
            auto_offset_reset = %auto_offset_reset,
            manual_commit = true,
            "Subscribed to parking events"
        );

        Ok(ParkingEventConsumer {
            consumer,
            topic,
            consumer_group,
        })
    }
}
