//! End-to-end lifecycle tests through the event router.
//!
//! Run with: `cargo test -p parksync-runtime --test lifecycle_tests`

#![allow(clippy::unwrap_used, clippy::expect_used)]

use parksync_core::{
    GatewayResponse, ParkingEvent, ReconcileError, SessionStatus, StoreError, ValidationError,
};
use parksync_runtime::{EventRouter, Outcome, ReconcilerEnvironment, SkipReason};
use parksync_testing::{
    GatewayCall, InMemorySessionStore, ScriptedGateway, fixtures, init_tracing, test_clock,
};
use proptest::prelude::*;
use std::sync::Arc;

fn router(gateway: &ScriptedGateway, store: &InMemorySessionStore) -> EventRouter {
    EventRouter::new(ReconcilerEnvironment {
        gateway: Arc::new(gateway.clone()),
        store: Arc::new(store.clone()),
        clock: Arc::new(test_clock()),
    })
}

fn start_event() -> ParkingEvent {
    ParkingEvent::start("P1", "ABC-123", "Z1", fixtures::t0())
}

#[tokio::test]
async fn start_extend_stop_reconciles_record() {
    init_tracing();
    let gateway = ScriptedGateway::new();
    gateway
        .on_begin(Ok(GatewayResponse::new("E1", SessionStatus::Active)))
        .on_extend(Ok(GatewayResponse::new("E1", SessionStatus::Active)))
        .on_end(Ok(GatewayResponse::new("E1", SessionStatus::Stopped)));
    let store = InMemorySessionStore::new();
    let router = router(&gateway, &store);

    router.route(start_event()).await.unwrap();
    let started = store.get("P1").unwrap();
    assert_eq!(started.external_id, "E1");
    assert_eq!(started.status, SessionStatus::Active);
    assert_eq!(started.end_time, None);

    router
        .route(ParkingEvent::extend("P1", fixtures::hours_after_t0(2)))
        .await
        .unwrap();
    assert_eq!(
        store.get("P1").unwrap().end_time,
        Some(fixtures::hours_after_t0(2))
    );

    router
        .route(ParkingEvent::stop("P1", fixtures::hours_after_t0(3)))
        .await
        .unwrap();
    let stopped = store.get("P1").unwrap();
    assert_eq!(stopped.status, SessionStatus::Stopped);
    assert_eq!(stopped.end_time, Some(fixtures::hours_after_t0(3)));
    assert_eq!(stopped.start_time, fixtures::t0());
    assert_eq!(gateway.call_count(), 3);
}

#[tokio::test]
async fn duplicate_start_begins_once() {
    let gateway = ScriptedGateway::new();
    gateway.on_begin(Ok(GatewayResponse::new("E1", SessionStatus::Active)));
    let store = InMemorySessionStore::new();
    let router = router(&gateway, &store);

    let first = router.route(start_event()).await.unwrap();
    let second = router.route(start_event()).await.unwrap();

    assert!(matches!(first, Outcome::Started { .. }));
    assert_eq!(second, Outcome::Skipped(SkipReason::AlreadyStarted));
    assert_eq!(store.len(), 1);
    assert_eq!(
        gateway
            .calls()
            .iter()
            .filter(|call| matches!(call, GatewayCall::Begin(_)))
            .count(),
        1
    );
}

#[tokio::test]
async fn compensation_ends_the_returned_session_exactly_once() {
    let gateway = ScriptedGateway::new();
    gateway
        .on_begin(Ok(GatewayResponse::new("E7", SessionStatus::Active)))
        .on_end(Ok(GatewayResponse::new("E7", SessionStatus::Stopped)));
    let store = InMemorySessionStore::new();
    store.fail_writes_with(StoreError::DatabaseError("connection reset".to_string()));

    let error = router(&gateway, &store)
        .route(start_event())
        .await
        .unwrap_err();

    assert!(matches!(error.primary(), ReconcileError::Persist { .. }));
    let ends = gateway.end_calls();
    assert_eq!(ends.len(), 1);
    assert!(matches!(&ends[0], GatewayCall::End { external_id, .. } if external_id == "E7"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn stop_failure_is_durable_and_later_stops_are_no_ops() {
    let gateway = ScriptedGateway::new();
    gateway.on_end(Ok(GatewayResponse::new("E1", SessionStatus::Failed)));
    let store = InMemorySessionStore::new();
    store.seed(fixtures::active_session());
    let router = router(&gateway, &store);

    let error = router
        .route(ParkingEvent::stop("P1", fixtures::hours_after_t0(1)))
        .await
        .unwrap_err();
    let retry = router
        .route(ParkingEvent::stop("P1", fixtures::hours_after_t0(1)))
        .await
        .unwrap();

    assert!(matches!(error.primary(), ReconcileError::StopFailed { .. }));
    assert_eq!(store.get("P1").unwrap().status, SessionStatus::Failed);
    assert_eq!(
        retry,
        Outcome::Skipped(SkipReason::NotActive(SessionStatus::Failed))
    );
    assert_eq!(gateway.call_count(), 1);
}

#[tokio::test]
async fn lookup_failure_is_retryable() {
    let gateway = ScriptedGateway::new();
    let store = InMemorySessionStore::new();
    store.fail_reads_with(StoreError::DatabaseError("timeout".to_string()));

    let error = router(&gateway, &store)
        .route(start_event())
        .await
        .unwrap_err();

    assert!(error.is_retryable());
    assert_eq!(gateway.call_count(), 0);
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(future)
}

proptest! {
    #[test]
    fn extension_ordering_is_enforced(current in 1i64..48, requested in 1i64..48) {
        let gateway = ScriptedGateway::new();
        gateway.on_extend(Ok(GatewayResponse::new("E1", SessionStatus::Active)));
        let store = InMemorySessionStore::new();
        store.seed(fixtures::active_session_until(fixtures::hours_after_t0(current)));

        let result = block_on(
            router(&gateway, &store).route(ParkingEvent::extend("P1", fixtures::hours_after_t0(requested))),
        );
        let recorded = store.get("P1").unwrap().end_time;

        if requested == current {
            prop_assert_eq!(result, Ok(Outcome::Skipped(SkipReason::DuplicateExtension)));
            prop_assert_eq!(gateway.call_count(), 0);
            prop_assert_eq!(store.write_count(), 0);
        } else if requested < current {
            let is_regression = matches!(
                result.as_ref().map_err(|e| e.primary()),
                Err(ReconcileError::Invalid(ValidationError::EndTimeRegression { .. }))
            );
            prop_assert!(is_regression);
            prop_assert_eq!(gateway.call_count(), 0);
            prop_assert_eq!(recorded, Some(fixtures::hours_after_t0(current)));
        } else {
            prop_assert!(result.is_ok());
            prop_assert_eq!(recorded, Some(fixtures::hours_after_t0(requested)));
        }
    }

    #[test]
    fn duplicate_deliveries_do_not_change_final_state(extend_to in 1i64..24, stay in 1i64..6) {
        let stop_at = extend_to + stay;
        let gateway = ScriptedGateway::new();
        gateway
            .on_begin(Ok(GatewayResponse::new("E1", SessionStatus::Active)))
            .on_extend(Ok(GatewayResponse::new("E1", SessionStatus::Active)))
            .on_end(Ok(GatewayResponse::new("E1", SessionStatus::Stopped)));
        let store = InMemorySessionStore::new();
        let router = router(&gateway, &store);

        let events = [
            start_event(),
            ParkingEvent::extend("P1", fixtures::hours_after_t0(extend_to)),
            ParkingEvent::stop("P1", fixtures::hours_after_t0(stop_at)),
        ];
        block_on(async {
            for event in events {
                router.route(event.clone()).await.unwrap();
                router.route(event).await.unwrap();
            }
        });

        let record = store.get("P1").unwrap();
        prop_assert_eq!(record.status, SessionStatus::Stopped);
        prop_assert_eq!(record.end_time, Some(fixtures::hours_after_t0(stop_at)));
        prop_assert_eq!(gateway.call_count(), 3);
        prop_assert_eq!(store.write_count(), 3);
    }
}
