//! # parksync Testing
//!
//! Test doubles and fixtures for the reconciliation engine.
//!
//! This crate provides:
//! - [`FixedClock`]: deterministic time
//! - [`InMemorySessionStore`]: `HashMap`-backed store with write counting and fault injection
//! - [`ScriptedGateway`]: gateway returning queued responses and recording every call
//! - [`RecordingDeadLetterSink`]: captures dead letters
//! - [`fixtures`]: canonical timestamps and records
//!
//! ## Example
//!
//! ```
//! use parksync_testing::{ScriptedGateway, InMemorySessionStore};
//! use parksync_core::{GatewayResponse, SessionStatus};
//!
//! let gateway = ScriptedGateway::new();
//! gateway.on_begin(Ok(GatewayResponse::new("E1", SessionStatus::Active)));
//!
//! let store = InMemorySessionStore::new();
//! assert_eq!(store.write_count(), 0);
//! ```

use chrono::{DateTime, Utc};
use parksync_core::environment::Clock;

mod dead_letter;
mod gateway;
mod store;

pub use dead_letter::RecordingDeadLetterSink;
pub use gateway::{GatewayCall, ScriptedGateway};
pub use store::InMemorySessionStore;

/// Fixed clock for deterministic tests
///
/// Always returns the same time, making tests reproducible.
///
/// # Example
///
/// ```
/// use parksync_testing::FixedClock;
/// use parksync_core::environment::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// assert_eq!(clock.now(), clock.now());
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Create a default fixed clock for tests (2025-01-01 12:00:00 UTC)
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(fixtures::t0() + chrono::Duration::hours(12))
}

/// Install a fmt subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parksync=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Canonical test data.
pub mod fixtures {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use parksync_core::{ParkingSession, SessionStatus};

    /// 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// `t0()` plus the given number of hours
    #[must_use]
    pub fn hours_after_t0(hours: i64) -> DateTime<Utc> {
        t0() + Duration::hours(hours)
    }

    /// Active session `P1` / `E1` for plate `ABC-123` in zone `Z1`, started at `t0()`.
    #[must_use]
    pub fn active_session() -> ParkingSession {
        ParkingSession {
            internal_id: "P1".to_string(),
            external_id: "E1".to_string(),
            license_plate: "ABC-123".to_string(),
            area_code: "Z1".to_string(),
            start_time: t0(),
            end_time: None,
            status: SessionStatus::Active,
            created_at: Some(t0()),
            updated_at: Some(t0()),
        }
    }

    /// [`active_session`] with the given end time.
    #[must_use]
    pub fn active_session_until(end_time: DateTime<Utc>) -> ParkingSession {
        ParkingSession {
            end_time: Some(end_time),
            ..active_session()
        }
    }

    /// [`active_session`] in the given status.
    #[must_use]
    pub fn session_with_status(status: SessionStatus) -> ParkingSession {
        ParkingSession {
            status,
            ..active_session()
        }
    }
}
