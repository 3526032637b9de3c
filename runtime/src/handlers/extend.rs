use super::require_session;
use crate::{Outcome, ReconcilerEnvironment, SkipReason};
use parksync_core::{
    ExtendParking, GatewayOperation, HandlerError, ReconcileError, SessionStatus, ValidationError,
};

/// Handles EXTEND: moves the end time of an active session forward.
///
/// Checks run in a fixed order: existence, duplicate, ordering, status. A
/// duplicate delivery is therefore a no-op even after the session stopped. Any
/// failure leaves the record untouched.
#[derive(Clone)]
pub struct ExtendParkingHandler {
    env: ReconcilerEnvironment,
}

impl ExtendParkingHandler {
    /// Create a handler over the given collaborators.
    #[must_use]
    pub const fn new(env: ReconcilerEnvironment) -> Self {
        Self { env }
    }

    /// Extend a parking session.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::NotFound`] if there is no record
    /// - [`ValidationError::EndTimeRegression`] if the end time would move back
    /// - [`ValidationError::NotActive`] if the session is stopped or failed
    /// - [`ReconcileError::Gateway`] / [`ReconcileError::Declined`] if the external
    ///   system did not confirm the extension
    /// - [`ReconcileError::Persist`] if the new end time could not be written
    pub async fn handle(&self, command: ExtendParking) -> Result<Outcome, HandlerError> {
        let parking_id = command.parking_id.as_str();
        let new_end_time = command.new_end_time;
        let session = require_session(self.env.store.as_ref(), parking_id).await?;

        if session.end_time == Some(new_end_time) {
            tracing::info!(
                parking_id,
                end_time = %new_end_time,
                "End time already recorded, skipping duplicate extension"
            );
            return Ok(Outcome::Skipped(SkipReason::DuplicateExtension));
        }

        if let Some(current) = session.end_time.filter(|current| new_end_time < *current) {
            return Err(ValidationError::EndTimeRegression {
                parking_id: parking_id.to_string(),
                requested: new_end_time,
                current,
            }
            .into());
        }

        if !session.is_active() {
            return Err(ValidationError::NotActive {
                parking_id: parking_id.to_string(),
                status: session.status,
            }
            .into());
        }

        let response = self
            .env
            .gateway
            .extend(&session.external_id, new_end_time)
            .await
            .map_err(|source| ReconcileError::Gateway {
                parking_id: parking_id.to_string(),
                operation: GatewayOperation::Extend,
                source,
            })?;

        if response.status != SessionStatus::Active {
            tracing::warn!(
                parking_id,
                external_id = %response.external_id,
                status = %response.status,
                "Extension declined, record left unchanged"
            );
            return Err(ReconcileError::Declined {
                parking_id: parking_id.to_string(),
                external_id: response.external_id,
                operation: GatewayOperation::Extend,
                status: response.status,
            }
            .into());
        }

        let stored = self
            .env
            .store
            .upsert(session.ended_at(new_end_time, SessionStatus::Active))
            .await
            .map_err(|source| ReconcileError::Persist {
                parking_id: parking_id.to_string(),
                source,
            })?;

        tracing::info!(
            parking_id,
            external_id = %stored.external_id,
            end_time = %new_end_time,
            "Parking extended"
        );
        Ok(Outcome::Extended { new_end_time })
    }
}
