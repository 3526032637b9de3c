//! The reconciled parking session record.

use crate::command::StartParking;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reconciliation state of a session.
///
/// The same representation is used by the external system's responses and by the
/// `status` column of the record store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Session is ongoing in the external system
    Active,
    /// Session was ended successfully
    Stopped,
    /// Session failed to start, extend, or stop correctly
    Failed,
}

impl SessionStatus {
    /// Stable string representation (`"ACTIVE"`, `"STOPPED"`, `"FAILED"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Stopped => "STOPPED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string that is not one of the known values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown session status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for SessionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "STOPPED" => Ok(Self::Stopped),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Local record of a parking session.
///
/// A record only exists once the external system accepted the session, so
/// `external_id` is always present. `license_plate`, `area_code` and `start_time`
/// never change after creation; `end_time` and `status` are mutated by extend and
/// stop. `created_at` / `updated_at` are maintained by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParkingSession {
    /// Identifier assigned by the event source (primary key)
    pub internal_id: String,
    /// Identifier assigned by the external system
    pub external_id: String,
    /// Vehicle license plate
    pub license_plate: String,
    /// Code of the parking area
    pub area_code: String,
    /// When the session started
    pub start_time: DateTime<Utc>,
    /// Planned or actual end of the session
    pub end_time: Option<DateTime<Utc>>,
    /// Reconciliation state
    pub status: SessionStatus,
    /// Set by the store on insert
    pub created_at: Option<DateTime<Utc>>,
    /// Set by the store on every write
    pub updated_at: Option<DateTime<Utc>>,
}

impl ParkingSession {
    /// Build the record for a session the external system just accepted.
    #[must_use]
    pub fn started(command: &StartParking, external_id: impl Into<String>) -> Self {
        Self {
            internal_id: command.parking_id.clone(),
            external_id: external_id.into(),
            license_plate: command.license_plate.clone(),
            area_code: command.area_code.clone(),
            start_time: command.start_time,
            end_time: command.end_time,
            status: SessionStatus::Active,
            created_at: None,
            updated_at: None,
        }
    }

    /// Copy of this record with a new end time and status.
    #[must_use]
    pub fn ended_at(&self, end_time: DateTime<Utc>, status: SessionStatus) -> Self {
        Self {
            end_time: Some(end_time),
            status,
            ..self.clone()
        }
    }

    /// Whether the session is still running externally.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}
