//! Redpanda consumer delivering parking events to the reconciliation engine.
//!
//! Uses rdkafka, so any Kafka-compatible broker works (Redpanda, Apache Kafka,
//! AWS MSK, ...).
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - An offset is committed only after the event was reconciled, or after it
//!   was durably written to the dead-letter sink
//! - If the process crashes before commit, the event is redelivered; handlers
//!   are idempotent
//! - Ordering per parking session comes from partitioning by `parkingId`; one
//!   consumer task processes its partitions sequentially
//!
//! # Failure Handling
//!
//! ```text
//! message ──decode──► ParkingEvent ──route──► Ok ───────────────► commit
//!    │                                  │
//!    │ poison                           ├─ retryable ─► redeliver (backoff)
//!    │                                  │                 │ exhausted
//!    ▼                                  ▼ permanent       ▼
//! dead-letter sink ◄────────────────────┴─────────────────┘ ──► commit
//! ```
//!
//! A dead-letter write that fails stops the consumer without committing.
//!
//! # Example
//!
//! ```no_run
//! use parksync_redpanda::{DeliveryProcessor, ParkingEventConsumer};
//!
//! # async fn example(processor: DeliveryProcessor) -> Result<(), Box<dyn std::error::Error>> {
//! let consumer = ParkingEventConsumer::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("parking-service")
//!     .topic("parking.events")
//!     .build()?;
//!
//! consumer.run(&processor, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await?;
//! # Ok(())
//! # }
//! ```

mod consumer;
mod delivery;

pub use consumer::{ParkingEventConsumer, ParkingEventConsumerBuilder};
pub use delivery::{DeadLetterReason, Delivery, DeliveryProcessor, Disposition};

use parksync_core::DeadLetterError;
use thiserror::Error;

/// Default topic carrying parking lifecycle events.
pub const DEFAULT_TOPIC: &str = "parking.events";

/// Errors from the parking event consumer.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Required configuration is missing or invalid
    #[error("Consumer configuration error: {0}")]
    Config(String),

    /// The Kafka client could not be created
    #[error("Failed to create consumer: {0}")]
    ConnectionFailed(String),

    /// Subscribing to the topic failed
    #[error("Failed to subscribe to {topic}: {reason}")]
    SubscriptionFailed {
        /// Topic
        topic: String,
        /// Client error
        reason: String,
    },

    /// An event could not be dead-lettered; its offset was not committed
    #[error("Failed to dead-letter {topic}/{partition}@{offset}: {source}")]
    DeadLetter {
        /// Topic of the message
        topic: String,
        /// Partition of the message
        partition: i32,
        /// Offset of the message
        offset: i64,
        /// Sink failure
        #[source]
        source: DeadLetterError,
    },
}
