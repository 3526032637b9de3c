//! Transport-independent handling of one consumed message.

use crate::ConsumerError;
use parksync_core::environment::Clock;
use parksync_core::{DeadLetter, DeadLetterSink, HandlerError, ParkingEvent, ParkingEventType};
use parksync_runtime::metrics::DeliveryMetrics;
use parksync_runtime::retry::{RetryPolicy, retry_with_predicate};
use parksync_runtime::{EventRouter, Outcome};
use std::sync::Arc;

/// A consumed message, detached from the Kafka client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Topic
    pub topic: String,
    /// Partition
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Message key (the parking id, when the producer set one)
    pub key: Option<String>,
    /// Raw payload
    pub payload: Option<Vec<u8>>,
}

/// Why a message was given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// The payload could not be decoded
    Poison,
    /// The handler failed with a non-retryable error
    Permanent,
    /// The handler kept failing with a retryable error
    Exhausted,
}

impl DeadLetterReason {
    /// Short label, used as a metric label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Poison => "poison",
            Self::Permanent => "permanent",
            Self::Exhausted => "exhausted",
        }
    }
}

/// What happened to a message. Either way its offset may now be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The handler succeeded
    Processed {
        /// Handler result
        outcome: Outcome,
        /// Handler invocations made
        attempts: u32,
    },
    /// The message was written to the dead-letter sink
    DeadLettered {
        /// Why
        reason: DeadLetterReason,
        /// Handler invocations made (0 for poison messages)
        attempts: u32,
    },
}

/// Decodes messages, routes them, redelivers retryable failures and
/// dead-letters the rest.
#[derive(Clone)]
pub struct DeliveryProcessor {
    router: EventRouter,
    dead_letters: Arc<dyn DeadLetterSink>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl DeliveryProcessor {
    /// Create a processor.
    #[must_use]
    pub fn new(
        router: EventRouter,
        dead_letters: Arc<dyn DeadLetterSink>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            router,
            dead_letters,
            policy,
            clock,
        }
    }

    /// Process one message to a final [`Disposition`].
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::DeadLetter`] if the message had to be
    /// dead-lettered and the sink refused it. The message must then not be
    /// acknowledged.
    pub async fn process(&self, delivery: &Delivery) -> Result<Disposition, ConsumerError> {
        let Some(payload) = delivery.payload.as_deref() else {
            self.dead_letter(delivery, None, DeadLetterReason::Poison, "Message has no payload", false, 0)
                .await?;
            return Ok(Disposition::DeadLettered {
                reason: DeadLetterReason::Poison,
                attempts: 0,
            });
        };

        let event = match ParkingEvent::from_json(payload) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(
                    topic = %delivery.topic,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    error = %error,
                    "Undecodable parking event"
                );
                self.dead_letter(
                    delivery,
                    None,
                    DeadLetterReason::Poison,
                    &error.to_string(),
                    false,
                    0,
                )
                .await?;
                return Ok(Disposition::DeadLettered {
                    reason: DeadLetterReason::Poison,
                    attempts: 0,
                });
            },
        };

        let result = retry_with_predicate(
            &self.policy,
            || self.router.route(event.clone()),
            HandlerError::is_retryable,
        )
        .await;
        DeliveryMetrics::record_redeliveries(result.attempts.saturating_sub(1));

        match result.result {
            Ok(outcome) => Ok(Disposition::Processed {
                outcome,
                attempts: result.attempts,
            }),
            Err(error) => {
                let reason = if error.is_retryable() {
                    DeadLetterReason::Exhausted
                } else {
                    DeadLetterReason::Permanent
                };
                self.dead_letter(
                    delivery,
                    Some(&event),
                    reason,
                    &error.to_string(),
                    error.is_retryable(),
                    result.attempts,
                )
                .await?;
                Ok(Disposition::DeadLettered {
                    reason,
                    attempts: result.attempts,
                })
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn dead_letter(
        &self,
        delivery: &Delivery,
        event: Option<&ParkingEvent>,
        reason: DeadLetterReason,
        error_message: &str,
        retryable: bool,
        attempts: u32,
    ) -> Result<(), ConsumerError> {
        let letter = DeadLetter {
            topic: delivery.topic.clone(),
            partition: delivery.partition,
            offset: delivery.offset,
            key: delivery.key.clone(),
            payload: delivery.payload.clone().unwrap_or_default(),
            parking_id: event.map(|e| e.parking_id.clone()),
            event_type: event.map(|e| e.event_type),
            error_message: error_message.to_string(),
            retryable,
            attempts,
            failed_at: self.clock.now(),
        };

        self.dead_letters
            .record(letter)
            .await
            .map_err(|source| ConsumerError::DeadLetter {
                topic: delivery.topic.clone(),
                partition: delivery.partition,
                offset: delivery.offset,
                source,
            })?;

        DeliveryMetrics::record_dead_letter(reason.label());
        tracing::warn!(
            parking_id = event.map_or("<unknown>", |e| e.parking_id.as_str()),
            event_type = event.map_or("<unknown>", |e| ParkingEventType::as_str(e.event_type)),
            reason = reason.label(),
            attempts,
            error = error_message,
            "Parking event dead-lettered"
        );
        Ok(())
    }
}
