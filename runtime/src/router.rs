//! Dispatch of inbound events to their handler.

use crate::handlers::{ExtendParkingHandler, StartParkingHandler, StopParkingHandler};
use crate::metrics::ReconcileMetrics;
use crate::{Outcome, ReconcilerEnvironment};
use parksync_core::{HandlerError, ParkingCommand, ParkingEvent};
use std::time::Instant;
use tracing::Instrument;

/// Routes events to the handler for their type.
///
/// The router owns exactly one handler per [`ParkingCommand`] variant, and
/// [`EventRouter::dispatch`] matches exhaustively, so adding a variant without
/// a handler does not compile.
#[derive(Clone)]
pub struct EventRouter {
    start: StartParkingHandler,
    extend: ExtendParkingHandler,
    stop: StopParkingHandler,
}

impl EventRouter {
    /// Build the router and its handlers over shared collaborators.
    #[must_use]
    pub fn new(env: ReconcilerEnvironment) -> Self {
        Self {
            start: StartParkingHandler::new(env.clone()),
            extend: ExtendParkingHandler::new(env.clone()),
            stop: StopParkingHandler::new(env),
        }
    }

    /// Run the handler for an already validated command.
    ///
    /// # Errors
    ///
    /// Returns the handler's error unchanged.
    pub async fn dispatch(&self, command: ParkingCommand) -> Result<Outcome, HandlerError> {
        match command {
            ParkingCommand::Start(command) => self.start.handle(command).await,
            ParkingCommand::Extend(command) => self.extend.handle(command).await,
            ParkingCommand::Stop(command) => self.stop.handle(command).await,
        }
    }

    /// Validate an event, run its handler, and record the result.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the event lacks a field its type requires,
    /// otherwise the handler's error.
    pub async fn route(&self, event: ParkingEvent) -> Result<Outcome, HandlerError> {
        let event_type = event.event_type;
        let span = tracing::info_span!(
            "parking_event",
            parking_id = %event.parking_id,
            event_type = %event_type,
        );

        async move {
            let started = Instant::now();
            tracing::debug!(
                price_amount = ?event.price_amount,
                currency = ?event.currency,
                "Received parking event"
            );

            let result = match ParkingCommand::try_from(event) {
                Ok(command) => self.dispatch(command).await,
                Err(error) => Err(HandlerError::from(error)),
            };

            match &result {
                Ok(outcome) => {
                    ReconcileMetrics::record_processed(event_type, outcome.label(), started.elapsed());
                    tracing::info!(outcome = %outcome, "Parking event handled");
                },
                Err(error) => {
                    ReconcileMetrics::record_failure(
                        event_type,
                        error.primary().kind(),
                        started.elapsed(),
                    );
                    tracing::warn!(
                        error = %error,
                        retryable = error.is_retryable(),
                        "Parking event failed"
                    );
                },
            }

            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::SkipReason;
    use parksync_core::{
        GatewayResponse, ParkingEventType, ReconcileError, SessionStatus, ValidationError,
    };
    use parksync_testing::{InMemorySessionStore, ScriptedGateway, fixtures, test_clock};
    use std::sync::Arc;

    fn router(gateway: &ScriptedGateway, store: &InMemorySessionStore) -> EventRouter {
        EventRouter::new(ReconcilerEnvironment {
            gateway: Arc::new(gateway.clone()),
            store: Arc::new(store.clone()),
            clock: Arc::new(test_clock()),
        })
    }

    #[tokio::test]
    async fn routes_each_type_to_its_handler() {
        let gateway = ScriptedGateway::new();
        let store = InMemorySessionStore::new();
        store.seed(fixtures::session_with_status(SessionStatus::Stopped));
        let router = router(&gateway, &store);

        let start = router
            .route(ParkingEvent::start("P1", "ABC-123", "Z1", fixtures::t0()))
            .await
            .unwrap();
        let stop = router
            .route(ParkingEvent::stop("P1", fixtures::hours_after_t0(1)))
            .await
            .unwrap();

        assert_eq!(start, Outcome::Skipped(SkipReason::AlreadyStarted));
        assert_eq!(
            stop,
            Outcome::Skipped(SkipReason::NotActive(SessionStatus::Stopped))
        );
    }

    #[tokio::test]
    async fn missing_required_field_fails_before_any_io() {
        let gateway = ScriptedGateway::new();
        let store = InMemorySessionStore::new();

        let error = router(&gateway, &store)
            .route(ParkingEvent::new(ParkingEventType::Extend, "P1"))
            .await
            .unwrap_err();

        assert_eq!(
            error.primary(),
            &ReconcileError::Invalid(ValidationError::MissingField {
                parking_id: "P1".to_string(),
                event_type: ParkingEventType::Extend,
                field: "endTime",
            })
        );
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn dispatch_reaches_start_handler() {
        let gateway = ScriptedGateway::new();
        gateway.on_begin(Ok(GatewayResponse::new("E1", SessionStatus::Active)));
        let store = InMemorySessionStore::new();
        let command =
            ParkingCommand::try_from(ParkingEvent::start("P1", "ABC-123", "Z1", fixtures::t0()))
                .unwrap();

        let outcome = router(&gateway, &store).dispatch(command).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Started {
                external_id: "E1".to_string()
            }
        );
    }
}
