use super::find_session;
use crate::metrics::ReconcileMetrics;
use crate::{Outcome, ReconcilerEnvironment, SkipReason};
use parksync_core::{
    BeginSession, Compensation, CompensationOutcome, GatewayOperation, HandlerError,
    ParkingSession, ReconcileError, SessionStatus, StartParking,
};

/// Handles START: begins the session externally, then creates the local record.
///
/// If creating the record fails after the external system accepted the session,
/// the external session is ended again so no orphan keeps running. The write
/// failure is what the caller sees; the compensation's outcome rides along.
#[derive(Clone)]
pub struct StartParkingHandler {
    env: ReconcilerEnvironment,
}

impl StartParkingHandler {
    /// Create a handler over the given collaborators.
    #[must_use]
    pub const fn new(env: ReconcilerEnvironment) -> Self {
        Self { env }
    }

    /// Start a parking session.
    ///
    /// A record that already exists for the parking id makes this a no-op.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::Lookup`] if the existing record could not be read
    /// - [`ReconcileError::Gateway`] if begin-session failed
    /// - [`ReconcileError::Declined`] if the session did not come back `ACTIVE`
    /// - [`ReconcileError::Persist`] if the record could not be created, with the
    ///   compensation attached
    pub async fn handle(&self, command: StartParking) -> Result<Outcome, HandlerError> {
        let parking_id = command.parking_id.as_str();

        if let Some(existing) = find_session(self.env.store.as_ref(), parking_id).await? {
            tracing::info!(
                parking_id,
                external_id = %existing.external_id,
                status = %existing.status,
                "Parking already started, skipping"
            );
            return Ok(Outcome::Skipped(SkipReason::AlreadyStarted));
        }

        let response = self
            .env
            .gateway
            .begin(BeginSession {
                license_plate: command.license_plate.clone(),
                area_code: command.area_code.clone(),
                start_time: command.start_time,
                end_time: command.end_time,
            })
            .await
            .map_err(|source| ReconcileError::Gateway {
                parking_id: parking_id.to_string(),
                operation: GatewayOperation::Begin,
                source,
            })?;

        if response.status != SessionStatus::Active {
            return Err(ReconcileError::Declined {
                parking_id: parking_id.to_string(),
                external_id: response.external_id,
                operation: GatewayOperation::Begin,
                status: response.status,
            }
            .into());
        }

        let session = ParkingSession::started(&command, response.external_id.clone());
        match self.env.store.insert(session).await {
            Ok(stored) => {
                tracing::info!(
                    parking_id,
                    external_id = %stored.external_id,
                    license_plate = %stored.license_plate,
                    area_code = %stored.area_code,
                    "Parking started"
                );
                Ok(Outcome::Started {
                    external_id: stored.external_id,
                })
            },
            Err(source) => {
                tracing::error!(
                    parking_id,
                    external_id = %response.external_id,
                    error = %source,
                    "Failed to save started parking, stopping external session"
                );
                let compensation = self.compensate(parking_id, response.external_id).await;
                Err(HandlerError::with_compensation(
                    ReconcileError::Persist {
                        parking_id: parking_id.to_string(),
                        source,
                    },
                    compensation,
                ))
            },
        }
    }

    async fn compensate(&self, parking_id: &str, external_id: String) -> Compensation {
        let outcome = match self.env.gateway.end(&external_id, self.env.clock.now()).await {
            Ok(response) if response.status == SessionStatus::Stopped => {
                tracing::info!(parking_id, external_id = %external_id, "Compensation stopped external session");
                CompensationOutcome::Confirmed
            },
            Ok(response) => {
                tracing::warn!(
                    parking_id,
                    external_id = %external_id,
                    status = %response.status,
                    "Compensation did not stop external session"
                );
                CompensationOutcome::Unconfirmed(response.status)
            },
            Err(error) => {
                tracing::error!(
                    parking_id,
                    external_id = %external_id,
                    error = %error,
                    "Compensation failed, external session may still be running"
                );
                CompensationOutcome::Failed(error)
            },
        };

        ReconcileMetrics::record_compensation(&outcome);
        Compensation {
            external_id,
            outcome,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use parksync_core::environment::Clock;
    use parksync_core::{GatewayError, GatewayResponse, ServiceFault, StoreError};
    use parksync_testing::{
        GatewayCall, InMemorySessionStore, ScriptedGateway, fixtures, test_clock,
    };
    use std::sync::Arc;

    fn command() -> StartParking {
        StartParking {
            parking_id: "P1".to_string(),
            license_plate: "ABC-123".to_string(),
            area_code: "Z1".to_string(),
            start_time: fixtures::t0(),
            end_time: None,
        }
    }

    fn handler(gateway: &ScriptedGateway, store: &InMemorySessionStore) -> StartParkingHandler {
        StartParkingHandler::new(ReconcilerEnvironment {
            gateway: Arc::new(gateway.clone()),
            store: Arc::new(store.clone()),
            clock: Arc::new(test_clock()),
        })
    }

    #[tokio::test]
    async fn creates_active_record_with_external_id() {
        let gateway = ScriptedGateway::new();
        gateway.on_begin(Ok(GatewayResponse::new("E1", SessionStatus::Active)));
        let store = InMemorySessionStore::new();

        let outcome = handler(&gateway, &store).handle(command()).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Started {
                external_id: "E1".to_string()
            }
        );
        let record = store.get("P1").unwrap();
        assert_eq!(record.external_id, "E1");
        assert_eq!(record.status, SessionStatus::Active);
        assert_eq!(record.end_time, None);
        assert_eq!(
            gateway.calls(),
            vec![GatewayCall::Begin(BeginSession {
                license_plate: "ABC-123".to_string(),
                area_code: "Z1".to_string(),
                start_time: fixtures::t0(),
                end_time: None,
            })]
        );
    }

    #[tokio::test]
    async fn existing_record_skips_gateway() {
        let gateway = ScriptedGateway::new();
        let store = InMemorySessionStore::new();
        store.seed(fixtures::active_session());

        let outcome = handler(&gateway, &store).handle(command()).await.unwrap();

        assert_eq!(outcome, Outcome::Skipped(SkipReason::AlreadyStarted));
        assert_eq!(gateway.call_count(), 0);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn declined_begin_writes_nothing() {
        let gateway = ScriptedGateway::new();
        gateway.on_begin(Ok(GatewayResponse::new("E1", SessionStatus::Failed)));
        let store = InMemorySessionStore::new();

        let error = handler(&gateway, &store)
            .handle(command())
            .await
            .unwrap_err();

        assert!(matches!(
            error.primary(),
            ReconcileError::Declined {
                status: SessionStatus::Failed,
                ..
            }
        ));
        assert!(store.is_empty());
        assert!(gateway.end_calls().is_empty());
    }

    #[tokio::test]
    async fn begin_service_fault_is_retryable_without_compensation() {
        let gateway = ScriptedGateway::new();
        gateway.on_begin(Err(ServiceFault::Timeout.into()));
        let store = InMemorySessionStore::new();

        let error = handler(&gateway, &store)
            .handle(command())
            .await
            .unwrap_err();

        assert!(error.is_retryable());
        assert!(error.compensation().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn persist_failure_compensates_with_clock_time() {
        let gateway = ScriptedGateway::new();
        gateway
            .on_begin(Ok(GatewayResponse::new("E1", SessionStatus::Active)))
            .on_end(Ok(GatewayResponse::new("E1", SessionStatus::Stopped)));
        let store = InMemorySessionStore::new();
        store.fail_writes_with(StoreError::DatabaseError("disk full".to_string()));

        let error = handler(&gateway, &store)
            .handle(command())
            .await
            .unwrap_err();

        assert!(matches!(error.primary(), ReconcileError::Persist { .. }));
        assert_eq!(
            error.compensation().map(|c| &c.outcome),
            Some(&CompensationOutcome::Confirmed)
        );
        assert_eq!(
            gateway.end_calls(),
            vec![GatewayCall::End {
                external_id: "E1".to_string(),
                actual_end_time: test_clock().now(),
            }]
        );
    }

    #[tokio::test]
    async fn failed_compensation_is_secondary() {
        let gateway = ScriptedGateway::new();
        gateway
            .on_begin(Ok(GatewayResponse::new("E1", SessionStatus::Active)))
            .on_end(Err(GatewayError::ClientFault {
                status: 404,
                message: "unknown session".to_string(),
            }));
        let store = InMemorySessionStore::new();
        store.fail_writes_with(StoreError::Conflict("P1".to_string()));

        let error = handler(&gateway, &store)
            .handle(command())
            .await
            .unwrap_err();

        assert!(matches!(
            error.primary(),
            ReconcileError::Persist {
                source: StoreError::Conflict(_),
                ..
            }
        ));
        assert!(matches!(
            error.secondary(),
            Some(GatewayError::ClientFault { status: 404, .. })
        ));
        assert!(!error.is_retryable());
    }

    #[tokio::test]
    async fn unconfirmed_compensation_is_reported() {
        let gateway = ScriptedGateway::new();
        gateway
            .on_begin(Ok(GatewayResponse::new("E1", SessionStatus::Active)))
            .on_end(Ok(GatewayResponse::new("E1", SessionStatus::Active)));
        let store = InMemorySessionStore::new();
        store.fail_writes_with(StoreError::DatabaseError("down".to_string()));

        let error = handler(&gateway, &store)
            .handle(command())
            .await
            .unwrap_err();

        assert_eq!(
            error.compensation().map(|c| &c.outcome),
            Some(&CompensationOutcome::Unconfirmed(SessionStatus::Active))
        );
        assert!(error.secondary().is_none());
    }
}
