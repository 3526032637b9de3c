//! Error types for constructing the SimplePark client

use thiserror::Error;

/// Errors that can occur when building a [`SimpleParkClient`](crate::SimpleParkClient).
///
/// Failures of individual calls are reported as
/// [`GatewayError`](parksync_core::GatewayError) instead.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Base URL is empty or not an absolute http(s) URL
    #[error("Invalid SimplePark base URL: {0}")]
    InvalidBaseUrl(String),

    /// API key is empty or not a valid header value
    #[error("Invalid SimplePark API key")]
    InvalidApiKey,

    /// The underlying HTTP client could not be created
    #[error("Failed to build HTTP client: {0}")]
    Http(String),
}
