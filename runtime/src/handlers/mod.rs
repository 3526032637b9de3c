//! One handler per lifecycle transition.
//!
//! Every handler follows the same shape: read the record, check the
//! precondition, call the gateway, write the record. Checks that only depend
//! on the event's own content live in command parsing, not here.

mod extend;
mod start;
mod stop;

pub use extend::ExtendParkingHandler;
pub use start::StartParkingHandler;
pub use stop::StopParkingHandler;

use parksync_core::{ParkingSession, ReconcileError, SessionStore};

/// Load the record for `parking_id`, mapping a store failure to a retryable lookup error.
async fn find_session(
    store: &dyn SessionStore,
    parking_id: &str,
) -> Result<Option<ParkingSession>, ReconcileError> {
    store
        .find(parking_id)
        .await
        .map_err(|source| ReconcileError::Lookup {
            parking_id: parking_id.to_string(),
            source,
        })
}

/// Load the record for `parking_id`; a missing record is [`ReconcileError::NotFound`].
async fn require_session(
    store: &dyn SessionStore,
    parking_id: &str,
) -> Result<ParkingSession, ReconcileError> {
    find_session(store, parking_id)
        .await?
        .ok_or_else(|| ReconcileError::NotFound(parking_id.to_string()))
}
