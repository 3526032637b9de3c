//! # parksync Runtime
//!
//! The reconciliation engine: one handler per lifecycle transition and the
//! [`EventRouter`] that dispatches inbound events to them.
//!
//! Handlers are the only writers of [`ParkingSession`](parksync_core::ParkingSession)
//! records. Each one reads the current record, checks its precondition, calls
//! the external system, then writes the record. No transaction spans the
//! external call and the local write; START compensates instead.
//!
//! ## Example
//!
//! ```no_run
//! use parksync_runtime::{EventRouter, ReconcilerEnvironment};
//! use parksync_core::{ParkingEvent, Utc, environment::SystemClock};
//! # use std::sync::Arc;
//! # async fn example(
//! #     gateway: Arc<dyn parksync_core::LifecycleGateway>,
//! #     store: Arc<dyn parksync_core::SessionStore>,
//! # ) -> Result<(), parksync_core::HandlerError> {
//! let router = EventRouter::new(ReconcilerEnvironment {
//!     gateway,
//!     store,
//!     clock: Arc::new(SystemClock),
//! });
//!
//! let outcome = router.route(ParkingEvent::stop("P1", Utc::now())).await?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use parksync_core::environment::Clock;
use parksync_core::{LifecycleGateway, SessionStatus, SessionStore};
use std::fmt;
use std::sync::Arc;

pub mod handlers;
pub mod metrics;
pub mod retry;
pub mod router;

pub use handlers::{ExtendParkingHandler, StartParkingHandler, StopParkingHandler};
pub use router::EventRouter;

/// Collaborators shared by every handler.
///
/// All fields are trait objects so production adapters and test doubles are
/// interchangeable; cloning only bumps reference counts.
#[derive(Clone)]
pub struct ReconcilerEnvironment {
    /// External parking-management system
    pub gateway: Arc<dyn LifecycleGateway>,
    /// Local record store
    pub store: Arc<dyn SessionStore>,
    /// Source of "now" for compensating calls
    pub clock: Arc<dyn Clock>,
}

/// Why a handler returned without doing anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// START for an id that already has a record
    AlreadyStarted,
    /// EXTEND to the end time already recorded
    DuplicateExtension,
    /// STOP for a session that is no longer active
    NotActive(SessionStatus),
}

/// Successful result of a handler invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A new record was created
    Started {
        /// Id assigned by the external system
        external_id: String,
    },
    /// The end time was moved
    Extended {
        /// End time now recorded
        new_end_time: DateTime<Utc>,
    },
    /// The session was ended
    Stopped {
        /// End time now recorded
        end_time: DateTime<Utc>,
    },
    /// Nothing to do; no external call and no write happened
    Skipped(SkipReason),
}

impl Outcome {
    /// Short label, used as a metric label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Extended { .. } => "extended",
            Self::Stopped { .. } => "stopped",
            Self::Skipped(_) => "skipped",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { external_id } => write!(f, "started as {external_id}"),
            Self::Extended { new_end_time } => write!(f, "extended to {new_end_time}"),
            Self::Stopped { end_time } => write!(f, "stopped at {end_time}"),
            Self::Skipped(SkipReason::AlreadyStarted) => f.write_str("skipped: already started"),
            Self::Skipped(SkipReason::DuplicateExtension) => {
                f.write_str("skipped: end time already recorded")
            },
            Self::Skipped(SkipReason::NotActive(status)) => write!(f, "skipped: session is {status}"),
        }
    }
}
