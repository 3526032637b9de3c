//! Inbound lifecycle events as delivered by the transport.
//!
//! Events are JSON documents keyed by `parkingId`. Which optional fields are
//! required depends on the event type; that check happens when the event is
//! converted into a [`ParkingCommand`](crate::command::ParkingCommand), not here.
//!
//! # Example
//!
//! ```
//! use parksync_core::event::{ParkingEvent, ParkingEventType};
//!
//! let event = ParkingEvent::from_json(
//!     br#"{"eventType":"START","parkingId":"P1","licensePlate":"ABC-123",
//!         "areaCode":"Z1","startTime":"2025-01-01T00:00:00Z"}"#,
//! )?;
//! assert_eq!(event.event_type, ParkingEventType::Start);
//! # Ok::<(), parksync_core::event::DecodeError>(())
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of lifecycle transition an event requests.
///
/// The producer side historically used `PARKING_STARTED` / `PARKING_EXTENDED` /
/// `PARKING_STOPPED`; both spellings are accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParkingEventType {
    /// Begin a new session
    #[serde(rename = "START", alias = "PARKING_STARTED")]
    Start,
    /// Move the end time of an active session forward
    #[serde(rename = "EXTEND", alias = "PARKING_EXTENDED")]
    Extend,
    /// End an active session
    #[serde(rename = "STOP", alias = "PARKING_STOPPED")]
    Stop,
}

impl ParkingEventType {
    /// All event types, in lifecycle order.
    pub const ALL: [Self; 3] = [Self::Start, Self::Extend, Self::Stop];

    /// Stable string representation, used for logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Extend => "EXTEND",
            Self::Stop => "STOP",
        }
    }

    /// Parse either spelling of an event type.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "START" | "PARKING_STARTED" => Some(Self::Start),
            "EXTEND" | "PARKING_EXTENDED" => Some(Self::Extend),
            "STOP" | "PARKING_STOPPED" => Some(Self::Stop),
            _ => None,
        }
    }
}

impl fmt::Display for ParkingEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while decoding a raw event payload.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Payload is not a valid parking event document (bad JSON, unknown event type,
    /// wrong field types).
    #[error("Malformed parking event: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Lifecycle event for a parking session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingEvent {
    /// Requested transition
    pub event_type: ParkingEventType,
    /// Internal parking id (always required)
    pub parking_id: String,
    /// Required for START
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_plate: Option<String>,
    /// Required for START
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_code: Option<String>,
    /// Required for START
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Optional for START, required for EXTEND and STOP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Carried for auditing only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_amount: Option<f64>,
    /// Carried for auditing only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl ParkingEvent {
    /// Decode an event from a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] if the payload is not a valid event.
    pub fn from_json(payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Encode the event as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, DecodeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Bare event of the given type with every optional field unset.
    #[must_use]
    pub fn new(event_type: ParkingEventType, parking_id: impl Into<String>) -> Self {
        Self {
            event_type,
            parking_id: parking_id.into(),
            license_plate: None,
            area_code: None,
            start_time: None,
            end_time: None,
            price_amount: None,
            currency: None,
        }
    }

    /// START event carrying every required field.
    #[must_use]
    pub fn start(
        parking_id: impl Into<String>,
        license_plate: impl Into<String>,
        area_code: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            license_plate: Some(license_plate.into()),
            area_code: Some(area_code.into()),
            start_time: Some(start_time),
            ..Self::new(ParkingEventType::Start, parking_id)
        }
    }

    /// EXTEND event to the given end time.
    #[must_use]
    pub fn extend(parking_id: impl Into<String>, end_time: DateTime<Utc>) -> Self {
        Self::new(ParkingEventType::Extend, parking_id).with_end_time(end_time)
    }

    /// STOP event at the given end time.
    #[must_use]
    pub fn stop(parking_id: impl Into<String>, end_time: DateTime<Utc>) -> Self {
        Self::new(ParkingEventType::Stop, parking_id).with_end_time(end_time)
    }

    /// Set the end time.
    #[must_use]
    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }
}
