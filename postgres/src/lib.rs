//! `PostgreSQL` adapters for parksync.
//!
//! - [`PostgresSessionStore`]: the [`SessionStore`](parksync_core::SessionStore)
//!   backing the reconciliation engine. The primary key on `internal_id` gives
//!   single-record atomic writes and turns a racing START into a uniqueness
//!   conflict.
//! - [`DeadLetterQueue`]: the [`DeadLetterSink`](parksync_core::DeadLetterSink)
//!   for events that could not be reconciled, plus the queries to triage them.
//!
//! Both share one pool and one set of embedded migrations.
//!
//! # Example
//!
//! ```no_run
//! use parksync_postgres::{DeadLetterQueue, PostgresSessionStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresSessionStore::connect("postgres://localhost/parking", 10).await?;
//! store.migrate().await?;
//! let dlq = DeadLetterQueue::new(store.pool().clone());
//! # Ok(())
//! # }
//! ```

mod dead_letter_queue;
mod session_store;

pub use dead_letter_queue::{DLQStatus, DeadLetterQueue, FailedParkingEvent};
pub use session_store::PostgresSessionStore;
