//! # SimplePark API Client
//!
//! HTTP binding of [`LifecycleGateway`](parksync_core::LifecycleGateway) for the
//! SimplePark parking-management API.
//!
//! ## Example
//!
//! ```no_run
//! use parksync_simplepark::{SimpleParkClient, SimpleParkConfig};
//! use parksync_core::{BeginSession, Utc};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SimpleParkClient::new(SimpleParkConfig::new(
//!     "https://api.simplepark.example",
//!     "secret",
//! ))?;
//!
//! let response = client
//!     .start_parking(&BeginSession {
//!         license_plate: "ABC-123".to_string(),
//!         area_code: "Z1".to_string(),
//!         start_time: Utc::now(),
//!         end_time: None,
//!     })
//!     .await?;
//!
//! println!("External id: {}", response.external_id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error classification
//!
//! | Outcome                          | Error                       |
//! |----------------------------------|-----------------------------|
//! | 4xx                              | `GatewayError::ClientFault` |
//! | 5xx                              | `ServiceFault::ServerError` |
//! | timeout                          | `ServiceFault::Timeout`     |
//! | connection failure               | `ServiceFault::Unreachable` |
//! | anything else, undecodable body  | `ServiceFault::Unexpected`  |

pub mod client;
pub mod error;

pub use client::{API_KEY_HEADER, DEFAULT_TIMEOUT, SimpleParkClient, SimpleParkConfig};
pub use error::ClientError;
