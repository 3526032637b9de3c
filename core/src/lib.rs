//! # parksync Core
//!
//! Core types and collaborator traits for reconciling parking sessions between the
//! local record store and the external parking-management service.
//!
//! ## Core Concepts
//!
//! - **`ParkingEvent`**: Loosely-typed lifecycle event as it arrives from the transport
//! - **`ParkingCommand`**: Strictly-typed, validated command derived from an event
//! - **`ParkingSession`**: The reconciled record, keyed by the internal parking id
//! - **`LifecycleGateway`**: The external system (begin / extend / end a session)
//! - **`SessionStore`**: Durable record store (lookup by key, insert, upsert)
//! - **`HandlerError`**: Primary failure plus optional compensation outcome
//!
//! ## Flow
//!
//! ```text
//! ParkingEvent ──parse──► ParkingCommand ──► handler
//!                                              │
//!                          ┌───────────────────┼──────────────────┐
//!                          ▼                   ▼                  ▼
//!                    SessionStore::find  LifecycleGateway   SessionStore::upsert
//! ```
//!
//! Every trait here returns `Pin<Box<dyn Future>>` so collaborators can be shared
//! as `Arc<dyn Trait>` across handlers and tasks.

pub use chrono::{DateTime, Utc};

pub mod command;
pub mod dead_letter;
pub mod error;
pub mod event;
pub mod gateway;
pub mod session;
pub mod store;

/// Environment module - injected dependencies that are not I/O collaborators.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Compensation needs "now" as the actual end time of an orphaned session;
    /// tests inject a fixed clock so the compensating call is deterministic.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use command::{ExtendParking, ParkingCommand, StartParking, StopParking, ValidationError};
pub use dead_letter::{DeadLetter, DeadLetterError, DeadLetterSink};
pub use error::{
    Compensation, CompensationOutcome, GatewayOperation, HandlerError, ReconcileError,
    StopFailure,
};
pub use event::{DecodeError, ParkingEvent, ParkingEventType};
pub use gateway::{
    BeginSession, GatewayError, GatewayFuture, GatewayResponse, GatewayResult, LifecycleGateway,
    ServiceFault,
};
pub use session::{ParkingSession, SessionStatus};
pub use store::{SessionStore, StoreError, StoreFuture};
