//! Abstraction over the external parking-management system.
//!
//! The gateway is a stateless request/response client with three operations:
//! begin, extend and end a session. Failures are split into two classes:
//!
//! - [`GatewayError::ClientFault`]: the external system rejected the request as
//!   invalid (4xx). Redelivery will not help.
//! - [`GatewayError::ServiceFault`]: the external system was unreachable, timed
//!   out, or failed server-side (5xx). Potentially transient; the outcome of the
//!   call is unknown.
//!
//! Handlers never retry a gateway call themselves. The classification is exposed
//! so the transport can decide whether a redelivery is worth attempting.
//!
//! # Implementations
//!
//! - `SimpleParkClient` (in `parksync-simplepark` crate): HTTP client for production
//! - `ScriptedGateway` (in `parksync-testing` crate): canned responses, records calls

use crate::session::SessionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Gateway result
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Boxed future returned by every gateway operation.
pub type GatewayFuture<'a> = Pin<Box<dyn Future<Output = GatewayResult<GatewayResponse>> + Send + 'a>>;

/// Server-side or transport failure of ambiguous durability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceFault {
    /// External system answered with a 5xx status
    #[error("Server error (status {status}): {message}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// Request exceeded its timeout
    #[error("Request timed out")]
    Timeout,

    /// Connection could not be established
    #[error("Service unreachable: {0}")]
    Unreachable(String),

    /// Anything else, including responses that could not be decoded
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Errors surfaced by a [`LifecycleGateway`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// External system rejected the request (4xx)
    #[error("Client error (status {status}): {message}")]
    ClientFault {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// External system unavailable or failing (5xx, timeout, connection failure)
    #[error(transparent)]
    ServiceFault(#[from] ServiceFault),
}

impl GatewayError {
    /// Whether redelivering the event might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceFault(_))
    }
}

/// Parameters of a begin-session call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BeginSession {
    /// Vehicle license plate
    pub license_plate: String,
    /// Code of the parking area
    pub area_code: String,
    /// When the session starts
    pub start_time: DateTime<Utc>,
    /// Planned end, if known
    pub end_time: Option<DateTime<Utc>>,
}

/// Answer of the external system to any of the three operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// Identifier assigned by the external system
    #[serde(rename = "parkingId")]
    pub external_id: String,
    /// Status of the session in the external system
    pub status: SessionStatus,
}

impl GatewayResponse {
    /// Convenience constructor.
    #[must_use]
    pub fn new(external_id: impl Into<String>, status: SessionStatus) -> Self {
        Self {
            external_id: external_id.into(),
            status,
        }
    }
}

/// Client for the external parking-management system.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so handlers can hold it as `Arc<dyn LifecycleGateway>`.
///
/// Implementations must not borrow the `external_id` argument in the returned
/// future; copy it first.
pub trait LifecycleGateway: Send + Sync {
    /// Begin a session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ClientFault`] if the request is rejected and
    /// [`GatewayError::ServiceFault`] if the system is unavailable.
    fn begin(&self, request: BeginSession) -> GatewayFuture<'_>;

    /// Move the end time of a session.
    ///
    /// # Errors
    ///
    /// Same classification as [`LifecycleGateway::begin`].
    fn extend(&self, external_id: &str, new_end_time: DateTime<Utc>) -> GatewayFuture<'_>;

    /// End a session.
    ///
    /// # Errors
    ///
    /// Same classification as [`LifecycleGateway::begin`].
    fn end(&self, external_id: &str, actual_end_time: DateTime<Utc>) -> GatewayFuture<'_>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn only_service_faults_are_retryable() {
        let client = GatewayError::ClientFault {
            status: 400,
            message: "bad plate".to_string(),
        };
        assert!(!client.is_retryable());

        for fault in [
            ServiceFault::Timeout,
            ServiceFault::Unreachable("connection refused".to_string()),
            ServiceFault::ServerError {
                status: 503,
                message: String::new(),
            },
        ] {
            assert!(GatewayError::from(fault).is_retryable());
        }
    }

    #[test]
    fn response_decodes_external_wire_format() {
        let response: GatewayResponse =
            serde_json::from_str(r#"{"parkingId":"E1","status":"ACTIVE"}"#).unwrap();
        assert_eq!(response, GatewayResponse::new("E1", SessionStatus::Active));
    }
}
