//! Integration tests for [`ParkingEventConsumer`] against a real Kafka broker.
//!
//! # Running These Tests
//!
//! These tests are marked as `#[ignore]` because they require Docker and take
//! 15-60 seconds to spin up Kafka:
//!
//! ```bash
//! cargo test -p parksync-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use parksync_core::{GatewayResponse, ParkingEvent, SessionStatus};
use parksync_redpanda::{DeliveryProcessor, ParkingEventConsumer};
use parksync_runtime::retry::RetryPolicy;
use parksync_runtime::{EventRouter, ReconcilerEnvironment};
use parksync_testing::{
    InMemorySessionStore, RecordingDeadLetterSink, ScriptedGateway, fixtures, test_clock,
};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

const TOPIC: &str = "parking.events";

async fn publish(producer: &FutureProducer, key: &str, payload: &[u8]) {
    for attempt in 1..=60 {
        let record = FutureRecord::to(TOPIC).key(key).payload(payload);
        if producer.send(record, Duration::from_secs(5)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(attempt != 60, "Kafka did not accept messages");
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn consumes_reconciles_and_dead_letters() {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");
    let host = kafka.get_host().await.expect("host");
    let port = kafka.get_host_port_ipv4(KAFKA_PORT).await.expect("port");
    let brokers = format!("{host}:{port}");

    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("message.timeout.ms", "5000")
        .create()
        .expect("producer");

    let start = ParkingEvent::start("P1", "ABC-123", "Z1", fixtures::t0())
        .to_json()
        .unwrap();
    publish(&producer, "P1", &start).await;
    publish(&producer, "P2", b"{not json").await;

    let gateway = ScriptedGateway::new();
    gateway.on_begin(Ok(GatewayResponse::new("E1", SessionStatus::Active)));
    let store = InMemorySessionStore::new();
    let sink = RecordingDeadLetterSink::new();
    let router = EventRouter::new(ReconcilerEnvironment {
        gateway: Arc::new(gateway.clone()),
        store: Arc::new(store.clone()),
        clock: Arc::new(test_clock()),
    });
    let processor = DeliveryProcessor::new(
        router,
        Arc::new(sink.clone()),
        RetryPolicy::no_retry(),
        Arc::new(test_clock()),
    );

    let consumer = ParkingEventConsumer::builder()
        .brokers(&brokers)
        .consumer_group("parksync-it")
        .topic(TOPIC)
        .build()
        .expect("consumer");

    let done = {
        let store = store.clone();
        let sink = sink.clone();
        async move {
            for _ in 0..300 {
                if store.get("P1").is_some() && !sink.letters().is_empty() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    };

    tokio::time::timeout(Duration::from_secs(60), consumer.run(&processor, done))
        .await
        .expect("consumer did not finish")
        .expect("consumer failed");

    assert_eq!(store.get("P1").unwrap().external_id, "E1");
    let letters = sink.letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].key.as_deref(), Some("P2"));
}
