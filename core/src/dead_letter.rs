//! Dead-letter sink for events that could not be reconciled.
//!
//! The transport hands an event to the sink when it failed permanently, when
//! redelivery attempts were exhausted, or when the payload could not be decoded
//! at all. Only after the sink accepted the letter may the event be acknowledged.

use crate::event::ParkingEventType;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from a dead-letter sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeadLetterError {
    /// The letter could not be stored
    #[error("Failed to record dead letter: {0}")]
    Storage(String),
}

/// An event that was given up on, with enough context to investigate and replay it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// Topic the event was consumed from
    pub topic: String,
    /// Partition the event was consumed from
    pub partition: i32,
    /// Offset of the event in its partition
    pub offset: i64,
    /// Message key, if any
    pub key: Option<String>,
    /// Raw payload as received
    pub payload: Vec<u8>,
    /// Internal parking id, when the payload could be decoded
    pub parking_id: Option<String>,
    /// Event type, when the payload could be decoded
    pub event_type: Option<ParkingEventType>,
    /// Final error message
    pub error_message: String,
    /// Whether the final failure was of a retryable class
    pub retryable: bool,
    /// Number of handler invocations made
    pub attempts: u32,
    /// When the event was given up on
    pub failed_at: DateTime<Utc>,
}

/// Destination for [`DeadLetter`]s.
pub trait DeadLetterSink: Send + Sync {
    /// Durably record a dead letter.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the letter could not be stored. The
    /// caller must then leave the event unacknowledged.
    fn record(
        &self,
        letter: DeadLetter,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterError>> + Send + '_>>;
}
