//! Record store for parking sessions.
//!
//! The store is keyed by the internal parking id and guarantees that a single
//! record write is atomic. It does not offer transactions spanning several
//! records or spanning a gateway call; handlers compensate instead.
//!
//! # Implementations
//!
//! - `PostgresSessionStore` (in `parksync-postgres` crate): production
//! - `InMemorySessionStore` (in `parksync-testing` crate): tests, with fault injection

use crate::session::ParkingSession;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A record with the same internal id already exists.
    ///
    /// Raised by [`SessionStore::insert`] when two deliveries race on the same id.
    #[error("Parking session {0} already exists")]
    Conflict(String),

    /// Database connection or query failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored row could not be mapped back to a [`ParkingSession`].
    #[error("Corrupt record for parking session {internal_id}: {reason}")]
    Corrupt {
        /// Key of the offending record
        internal_id: String,
        /// What could not be decoded
        reason: String,
    },
}

/// Durable store of [`ParkingSession`] records.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so handlers can hold it as `Arc<dyn SessionStore>`.
pub trait SessionStore: Send + Sync {
    /// Load the record for an internal id, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] or [`StoreError::Corrupt`].
    fn find(&self, internal_id: &str) -> StoreFuture<'_, Option<ParkingSession>>;

    /// Create a record. Fails if one already exists for the same internal id.
    ///
    /// Returns the record as stored (audit fields populated).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the id is taken, or
    /// [`StoreError::DatabaseError`].
    fn insert(&self, session: ParkingSession) -> StoreFuture<'_, ParkingSession>;

    /// Create or replace the mutable fields (`end_time`, `status`) of a record.
    ///
    /// Returns the record as stored (audit fields populated).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`].
    fn upsert(&self, session: ParkingSession) -> StoreFuture<'_, ParkingSession>;
}
