//! Strictly-typed commands derived from inbound events.
//!
//! Each [`ParkingCommand`] variant carries exactly the fields its transition
//! needs, so handlers never re-check for missing values. Conversion from a
//! [`ParkingEvent`] is the single place where required fields are enforced.

use crate::event::{ParkingEvent, ParkingEventType};
use crate::session::SessionStatus;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Permanent failures caused by the content of an event or by the state it
/// would transition from. Redelivering the same event reproduces them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `parkingId` is empty
    #[error("parkingId must not be blank for {event_type} event")]
    BlankParkingId {
        /// Type of the offending event
        event_type: ParkingEventType,
    },

    /// A field required by the event type is missing or blank
    #[error("{field} is required for {event_type} event on parking {parking_id}")]
    MissingField {
        /// Parking the event refers to
        parking_id: String,
        /// Type of the offending event
        event_type: ParkingEventType,
        /// Wire name of the missing field
        field: &'static str,
    },

    /// EXTEND asked for an end time before the current one
    #[error(
        "New end time for parking {parking_id} must be after current end time. Provided: {requested}, current: {current}"
    )]
    EndTimeRegression {
        /// Parking the event refers to
        parking_id: String,
        /// End time carried by the event
        requested: DateTime<Utc>,
        /// End time currently recorded
        current: DateTime<Utc>,
    },

    /// STOP carried an end time that is not after the session start
    #[error(
        "End time for parking {parking_id} must be after start time. Provided: {end_time}, start: {start_time}"
    )]
    EndNotAfterStart {
        /// Parking the event refers to
        parking_id: String,
        /// End time carried by the event
        end_time: DateTime<Utc>,
        /// Recorded start time
        start_time: DateTime<Utc>,
    },

    /// The transition is not allowed from the recorded status
    #[error("Parking {parking_id} is not active. Actual status: {status}")]
    NotActive {
        /// Parking the event refers to
        parking_id: String,
        /// Recorded status
        status: SessionStatus,
    },
}

/// Begin a new session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartParking {
    /// Internal parking id
    pub parking_id: String,
    /// Vehicle license plate
    pub license_plate: String,
    /// Code of the parking area
    pub area_code: String,
    /// When the session starts
    pub start_time: DateTime<Utc>,
    /// Planned end, if known up front
    pub end_time: Option<DateTime<Utc>>,
}

/// Move the end of an active session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendParking {
    /// Internal parking id
    pub parking_id: String,
    /// Requested new end time
    pub new_end_time: DateTime<Utc>,
}

/// End an active session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StopParking {
    /// Internal parking id
    pub parking_id: String,
    /// Actual end time
    pub end_time: DateTime<Utc>,
}

/// Validated lifecycle command. One variant per [`ParkingEventType`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParkingCommand {
    /// See [`StartParking`]
    Start(StartParking),
    /// See [`ExtendParking`]
    Extend(ExtendParking),
    /// See [`StopParking`]
    Stop(StopParking),
}

impl ParkingCommand {
    /// Internal parking id the command applies to.
    #[must_use]
    pub fn parking_id(&self) -> &str {
        match self {
            Self::Start(command) => &command.parking_id,
            Self::Extend(command) => &command.parking_id,
            Self::Stop(command) => &command.parking_id,
        }
    }

    /// Event type the command was parsed from.
    #[must_use]
    pub const fn event_type(&self) -> ParkingEventType {
        match self {
            Self::Start(_) => ParkingEventType::Start,
            Self::Extend(_) => ParkingEventType::Extend,
            Self::Stop(_) => ParkingEventType::Stop,
        }
    }
}

impl TryFrom<ParkingEvent> for ParkingCommand {
    type Error = ValidationError;

    fn try_from(event: ParkingEvent) -> Result<Self, Self::Error> {
        let event_type = event.event_type;
        if event.parking_id.trim().is_empty() {
            return Err(ValidationError::BlankParkingId { event_type });
        }

        let missing = |field: &'static str| ValidationError::MissingField {
            parking_id: event.parking_id.clone(),
            event_type,
            field,
        };
        let non_blank = |value: Option<String>, field: &'static str| {
            value.filter(|v| !v.trim().is_empty()).ok_or_else(|| missing(field))
        };

        match event_type {
            ParkingEventType::Start => {
                let license_plate = non_blank(event.license_plate, "licensePlate")?;
                let area_code = non_blank(event.area_code, "areaCode")?;
                let start_time = event.start_time.ok_or_else(|| missing("startTime"))?;
                Ok(Self::Start(StartParking {
                    parking_id: event.parking_id,
                    license_plate,
                    area_code,
                    start_time,
                    end_time: event.end_time,
                }))
            },
            ParkingEventType::Extend => {
                let new_end_time = event.end_time.ok_or_else(|| missing("endTime"))?;
                Ok(Self::Extend(ExtendParking {
                    parking_id: event.parking_id,
                    new_end_time,
                }))
            },
            ParkingEventType::Stop => {
                let end_time = event.end_time.ok_or_else(|| missing("endTime"))?;
                Ok(Self::Stop(StopParking {
                    parking_id: event.parking_id,
                    end_time,
                }))
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn start_event_becomes_start_command() {
        let event = ParkingEvent::start("P1", "ABC-123", "Z1", t0());

        let command = ParkingCommand::try_from(event).unwrap();

        assert_eq!(
            command,
            ParkingCommand::Start(StartParking {
                parking_id: "P1".to_string(),
                license_plate: "ABC-123".to_string(),
                area_code: "Z1".to_string(),
                start_time: t0(),
                end_time: None,
            })
        );
        assert_eq!(command.parking_id(), "P1");
        assert_eq!(command.event_type(), ParkingEventType::Start);
    }

    #[test]
    fn start_reports_first_missing_field() {
        let mut event = ParkingEvent::start("P1", "ABC-123", "Z1", t0());
        event.area_code = None;
        event.start_time = None;

        let err = ParkingCommand::try_from(event).unwrap_err();

        assert_eq!(
            err,
            ValidationError::MissingField {
                parking_id: "P1".to_string(),
                event_type: ParkingEventType::Start,
                field: "areaCode",
            }
        );
    }

    #[test]
    fn blank_license_plate_counts_as_missing() {
        let event = ParkingEvent::start("P1", "  ", "Z1", t0());

        let err = ParkingCommand::try_from(event).unwrap_err();

        assert!(matches!(
            err,
            ValidationError::MissingField { field: "licensePlate", .. }
        ));
    }

    #[test]
    fn extend_and_stop_require_end_time() {
        for event_type in [ParkingEventType::Extend, ParkingEventType::Stop] {
            let err = ParkingCommand::try_from(ParkingEvent::new(event_type, "P1")).unwrap_err();
            assert!(matches!(
                err,
                ValidationError::MissingField { field: "endTime", .. }
            ));
        }
    }

    #[test]
    fn blank_parking_id_is_rejected_for_every_type() {
        for event_type in ParkingEventType::ALL {
            let err = ParkingCommand::try_from(ParkingEvent::new(event_type, "")).unwrap_err();
            assert_eq!(err, ValidationError::BlankParkingId { event_type });
        }
    }

    #[test]
    fn extra_fields_are_ignored_for_stop() {
        let mut event = ParkingEvent::stop("P1", t0());
        event.license_plate = Some("ignored".to_string());
        event.price_amount = Some(3.0);

        let command = ParkingCommand::try_from(event).unwrap();

        assert_eq!(
            command,
            ParkingCommand::Stop(StopParking {
                parking_id: "P1".to_string(),
                end_time: t0(),
            })
        );
    }
}
