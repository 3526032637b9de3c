//! Prometheus metrics for observability and monitoring.
//!
//! Metric families:
//! - Event handling (processed / failed per event type)
//! - Compensations issued after a failed local write
//! - Gateway request latency
//! - Delivery (redeliveries, dead letters, commits)
//!
//! # Example
//!
//! ```rust,no_run
//! use parksync_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Serve metrics on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.serve()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use parksync_core::{CompensationOutcome, GatewayOperation, ParkingEventType};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Events handled, labelled by `event_type` and `outcome`.
pub const EVENTS_PROCESSED: &str = "parking_events_processed_total";
/// Events whose handler failed, labelled by `event_type` and `kind`.
pub const EVENTS_FAILED: &str = "parking_events_failed_total";
/// Handler latency, labelled by `event_type`.
pub const EVENT_DURATION: &str = "parking_event_handling_duration_seconds";
/// Compensating calls, labelled by `outcome`.
pub const COMPENSATIONS: &str = "parking_compensations_total";
/// Gateway latency, labelled by `operation` and `result`.
pub const GATEWAY_DURATION: &str = "parking_gateway_request_duration_seconds";
/// Redeliveries of a retryable failure.
pub const REDELIVERIES: &str = "parking_event_redeliveries_total";
/// Events written to the dead-letter sink, labelled by `reason`.
pub const DEAD_LETTERED: &str = "parking_events_dead_lettered_total";
/// Offsets committed.
pub const COMMITTED: &str = "parking_events_committed_total";

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    fn builder() -> Result<PrometheusBuilder, MetricsError> {
        PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )
            .map_err(|e| MetricsError::Build(e.to_string()))
    }

    /// Install the global recorder and serve `/metrics` on the configured address.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or a recorder is already installed.
    pub fn serve(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        Self::builder()?
            .with_http_listener(self.addr)
            .install()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Install the global recorder without an HTTP listener and keep a handle for rendering.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this logs a
    /// warning and leaves [`MetricsServer::handle`] empty.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        match Self::builder()?.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if no recorder was installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(EVENTS_PROCESSED, "Total number of parking events handled successfully");
    describe_counter!(EVENTS_FAILED, "Total number of parking events whose handler failed");
    describe_histogram!(EVENT_DURATION, "Time taken to handle a parking event");
    describe_counter!(
        COMPENSATIONS,
        "Total number of compensating end-session calls after a failed local write"
    );
    describe_histogram!(GATEWAY_DURATION, "Time taken by calls to the parking-management service");
    describe_counter!(REDELIVERIES, "Total number of in-process redeliveries");
    describe_counter!(DEAD_LETTERED, "Total number of events written to the dead-letter sink");
    describe_counter!(COMMITTED, "Total number of consumer offsets committed");
}

/// Handler metrics recorder.
pub struct ReconcileMetrics;

impl ReconcileMetrics {
    /// Record a successful handler invocation.
    pub fn record_processed(event_type: ParkingEventType, outcome: &'static str, duration: Duration) {
        counter!(EVENTS_PROCESSED, "event_type" => event_type.as_str(), "outcome" => outcome)
            .increment(1);
        histogram!(EVENT_DURATION, "event_type" => event_type.as_str())
            .record(duration.as_secs_f64());
    }

    /// Record a failed handler invocation.
    pub fn record_failure(event_type: ParkingEventType, kind: &'static str, duration: Duration) {
        counter!(EVENTS_FAILED, "event_type" => event_type.as_str(), "kind" => kind).increment(1);
        histogram!(EVENT_DURATION, "event_type" => event_type.as_str())
            .record(duration.as_secs_f64());
    }

    /// Record a compensating call.
    pub fn record_compensation(outcome: &CompensationOutcome) {
        counter!(COMPENSATIONS, "outcome" => outcome.label()).increment(1);
    }
}

/// Gateway metrics recorder.
pub struct GatewayMetrics;

impl GatewayMetrics {
    /// Record a gateway call.
    pub fn record_request(operation: GatewayOperation, result: &'static str, duration: Duration) {
        histogram!(GATEWAY_DURATION, "operation" => operation.as_str(), "result" => result)
            .record(duration.as_secs_f64());
    }
}

/// Delivery metrics recorder.
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    /// Record redeliveries made for one event.
    pub fn record_redeliveries(count: u32) {
        if count > 0 {
            counter!(REDELIVERIES).increment(u64::from(count));
        }
    }

    /// Record an event written to the dead-letter sink.
    pub fn record_dead_letter(reason: &'static str) {
        counter!(DEAD_LETTERED, "reason" => reason).increment(1);
    }

    /// Record a committed offset.
    pub fn record_commit() {
        counter!(COMMITTED).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[tokio::test]
    async fn test_metrics_server_render() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        server.start().unwrap();

        ReconcileMetrics::record_processed(
            ParkingEventType::Start,
            "started",
            Duration::from_millis(10),
        );
        ReconcileMetrics::record_compensation(&CompensationOutcome::Confirmed);
        GatewayMetrics::record_request(GatewayOperation::Begin, "ok", Duration::from_millis(5));

        // Another test may have installed the recorder first; metrics are still recorded.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains(EVENTS_PROCESSED));
            assert!(rendered.contains(COMPENSATIONS));
            assert!(rendered.contains(GATEWAY_DURATION));
        }
    }
}
