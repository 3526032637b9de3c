use super::require_session;
use crate::{Outcome, ReconcilerEnvironment, SkipReason};
use parksync_core::{
    GatewayOperation, HandlerError, ReconcileError, SessionStatus, StopFailure, StopParking,
    ValidationError,
};

/// Handles STOP: ends the session externally and records the result.
///
/// The record is written on both branches. A confirmed stop marks it `STOPPED`;
/// anything else marks it `FAILED` before the failure is raised.
#[derive(Clone)]
pub struct StopParkingHandler {
    env: ReconcilerEnvironment,
}

impl StopParkingHandler {
    /// Create a handler over the given collaborators.
    #[must_use]
    pub const fn new(env: ReconcilerEnvironment) -> Self {
        Self { env }
    }

    /// Stop a parking session.
    ///
    /// A session that is no longer active makes this a no-op.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::NotFound`] if there is no record
    /// - [`ValidationError::EndNotAfterStart`] if the end time is not after the start
    /// - [`ReconcileError::StopFailed`] if the external system did not confirm the
    ///   stop (the record is now `FAILED`)
    /// - [`ReconcileError::Persist`] if the final record could not be written
    pub async fn handle(&self, command: StopParking) -> Result<Outcome, HandlerError> {
        let parking_id = command.parking_id.as_str();
        let end_time = command.end_time;
        let session = require_session(self.env.store.as_ref(), parking_id).await?;

        if !session.is_active() {
            tracing::info!(
                parking_id,
                status = %session.status,
                "Parking is not active, skipping stop"
            );
            return Ok(Outcome::Skipped(SkipReason::NotActive(session.status)));
        }

        if end_time <= session.start_time {
            return Err(ValidationError::EndNotAfterStart {
                parking_id: parking_id.to_string(),
                end_time,
                start_time: session.start_time,
            }
            .into());
        }

        let reason = match self.env.gateway.end(&session.external_id, end_time).await {
            Ok(response) if response.status == SessionStatus::Stopped => {
                self.env
                    .store
                    .upsert(session.ended_at(end_time, SessionStatus::Stopped))
                    .await
                    .map_err(|source| ReconcileError::Persist {
                        parking_id: parking_id.to_string(),
                        source,
                    })?;
                tracing::info!(
                    parking_id,
                    external_id = %session.external_id,
                    end_time = %end_time,
                    "Parking stopped"
                );
                return Ok(Outcome::Stopped { end_time });
            },
            Ok(response) => StopFailure::UnexpectedStatus(response.status),
            Err(error) => StopFailure::Gateway(error),
        };

        tracing::error!(
            parking_id,
            external_id = %session.external_id,
            operation = %GatewayOperation::End,
            error = %reason,
            "Failed to stop parking, marking as FAILED"
        );

        if let Err(source) = self
            .env
            .store
            .upsert(session.ended_at(end_time, SessionStatus::Failed))
            .await
        {
            tracing::error!(
                parking_id,
                error = %source,
                "Failed to mark parking as FAILED"
            );
            return Err(ReconcileError::Persist {
                parking_id: parking_id.to_string(),
                source,
            }
            .into());
        }

        Err(ReconcileError::StopFailed {
            parking_id: parking_id.to_string(),
            external_id: session.external_id,
            reason,
        }
        .into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use parksync_core::{GatewayError, GatewayResponse, ServiceFault, StoreError};
    use parksync_testing::{InMemorySessionStore, ScriptedGateway, fixtures, test_clock};
    use std::sync::Arc;

    fn command(hours: i64) -> StopParking {
        StopParking {
            parking_id: "P1".to_string(),
            end_time: fixtures::hours_after_t0(hours),
        }
    }

    fn handler(gateway: &ScriptedGateway, store: &InMemorySessionStore) -> StopParkingHandler {
        StopParkingHandler::new(ReconcilerEnvironment {
            gateway: Arc::new(gateway.clone()),
            store: Arc::new(store.clone()),
            clock: Arc::new(test_clock()),
        })
    }

    #[tokio::test]
    async fn confirmed_stop_marks_stopped() {
        let gateway = ScriptedGateway::new();
        gateway.on_end(Ok(GatewayResponse::new("E1", SessionStatus::Stopped)));
        let store = InMemorySessionStore::new();
        store.seed(fixtures::active_session());

        let outcome = handler(&gateway, &store).handle(command(3)).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Stopped {
                end_time: fixtures::hours_after_t0(3)
            }
        );
        let record = store.get("P1").unwrap();
        assert_eq!(record.status, SessionStatus::Stopped);
        assert_eq!(record.end_time, Some(fixtures::hours_after_t0(3)));
    }

    #[tokio::test]
    async fn terminal_sessions_are_skipped() {
        for status in [SessionStatus::Stopped, SessionStatus::Failed] {
            let gateway = ScriptedGateway::new();
            let store = InMemorySessionStore::new();
            store.seed(fixtures::session_with_status(status));

            let outcome = handler(&gateway, &store).handle(command(3)).await.unwrap();

            assert_eq!(outcome, Outcome::Skipped(SkipReason::NotActive(status)));
            assert_eq!(gateway.call_count(), 0);
            assert_eq!(store.write_count(), 0);
        }
    }

    #[tokio::test]
    async fn end_at_start_is_rejected() {
        let gateway = ScriptedGateway::new();
        let store = InMemorySessionStore::new();
        store.seed(fixtures::active_session());

        let error = handler(&gateway, &store).handle(command(0)).await.unwrap_err();

        assert!(matches!(
            error.primary(),
            ReconcileError::Invalid(ValidationError::EndNotAfterStart { .. })
        ));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn unexpected_status_marks_failed_then_raises() {
        let gateway = ScriptedGateway::new();
        gateway.on_end(Ok(GatewayResponse::new("E1", SessionStatus::Active)));
        let store = InMemorySessionStore::new();
        store.seed(fixtures::active_session());

        let error = handler(&gateway, &store).handle(command(3)).await.unwrap_err();

        assert!(matches!(
            error.primary(),
            ReconcileError::StopFailed {
                reason: StopFailure::UnexpectedStatus(SessionStatus::Active),
                ..
            }
        ));
        let record = store.get("P1").unwrap();
        assert_eq!(record.status, SessionStatus::Failed);
        assert_eq!(record.end_time, Some(fixtures::hours_after_t0(3)));
    }

    #[tokio::test]
    async fn gateway_error_marks_failed_and_carries_cause() {
        let gateway = ScriptedGateway::new();
        gateway.on_end(Err(ServiceFault::Timeout.into()));
        let store = InMemorySessionStore::new();
        store.seed(fixtures::active_session());

        let error = handler(&gateway, &store).handle(command(3)).await.unwrap_err();

        assert_eq!(
            error.primary(),
            &ReconcileError::StopFailed {
                parking_id: "P1".to_string(),
                external_id: "E1".to_string(),
                reason: StopFailure::Gateway(GatewayError::ServiceFault(ServiceFault::Timeout)),
            }
        );
        assert!(!error.is_retryable());
        assert_eq!(store.get("P1").unwrap().status, SessionStatus::Failed);
    }

    #[tokio::test]
    async fn failed_marking_write_surfaces_persist_error() {
        let gateway = ScriptedGateway::new();
        gateway.on_end(Ok(GatewayResponse::new("E1", SessionStatus::Failed)));
        let store = InMemorySessionStore::new();
        store.seed(fixtures::active_session());
        store.fail_writes_with(StoreError::DatabaseError("down".to_string()));

        let error = handler(&gateway, &store).handle(command(3)).await.unwrap_err();

        assert!(matches!(error.primary(), ReconcileError::Persist { .. }));
        assert!(store.get("P1").unwrap().is_active());
    }
}
