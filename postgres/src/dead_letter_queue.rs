//! Dead Letter Queue (DLQ) for parking events that could not be reconciled.
//!
//! Provides persistent storage and management of events that failed
//! permanently, exhausted their redeliveries, or could not be decoded. Enables
//! incident response and manual replay.

use chrono::{DateTime, Utc};
use parksync_core::{DeadLetter, DeadLetterError, DeadLetterSink, ParkingEventType};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;

/// Status of a failed event in the Dead Letter Queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DLQStatus {
    /// Event is pending investigation/reprocessing
    Pending,
    /// Event is currently being processed
    Processing,
    /// Event was successfully reprocessed
    Resolved,
    /// Event was permanently discarded (cannot be fixed)
    Discarded,
}

impl DLQStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns error if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, DeadLetterError> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            _ => Err(DeadLetterError::Storage(format!("Invalid DLQ status: {s}"))),
        }
    }
}

/// An entry in the Dead Letter Queue.
#[derive(Debug, Clone)]
pub struct FailedParkingEvent {
    /// Unique identifier for this DLQ entry
    pub id: i64,
    /// The letter as it was recorded
    pub letter: DeadLetter,
    /// Current processing status
    pub status: DLQStatus,
    /// When the failure was resolved (if applicable)
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who/what resolved the failure
    pub resolved_by: Option<String>,
    /// Notes about the resolution
    pub resolution_notes: Option<String>,
}

const SELECT_COLUMNS: &str = r"
    SELECT
        id, topic, partition_id, message_offset, message_key, payload,
        parking_id, event_type, error_message, retryable, attempts, failed_at,
        status, resolved_at, resolved_by, resolution_notes
    FROM failed_parking_events
";

/// `PostgreSQL`-based Dead Letter Queue for parking events.
///
/// # Example
///
/// ```no_run
/// use parksync_postgres::{DLQStatus, DeadLetterQueue};
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let dlq = DeadLetterQueue::new(pool);
///
/// // List pending failures
/// let pending = dlq.list_pending(100).await?;
/// println!("Pending failures: {}", pending.len());
///
/// if let Some(first) = pending.first() {
///     dlq.update_status(first.id, DLQStatus::Processing).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DeadLetterQueue {
    pool: PgPool,
}

impl DeadLetterQueue {
    /// Create a new Dead Letter Queue with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Add a letter to the DLQ.
    ///
    /// # Returns
    ///
    /// The unique ID of the created DLQ entry.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the insert fails.
    pub async fn add_entry(&self, letter: &DeadLetter) -> Result<i64, DeadLetterError> {
        let attempts = i32::try_from(letter.attempts).unwrap_or(i32::MAX);
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO failed_parking_events (
                topic, partition_id, message_offset, message_key, payload,
                parking_id, event_type, error_message, retryable, attempts, failed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            ",
        )
        .bind(&letter.topic)
        .bind(letter.partition)
        .bind(letter.offset)
        .bind(letter.key.as_deref())
        .bind(&letter.payload)
        .bind(letter.parking_id.as_deref())
        .bind(letter.event_type.map(ParkingEventType::as_str))
        .bind(&letter.error_message)
        .bind(letter.retryable)
        .bind(attempts)
        .bind(letter.failed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

        tracing::warn!(
            dlq_id = id,
            parking_id = letter.parking_id.as_deref().unwrap_or("<unknown>"),
            partition = letter.partition,
            offset = letter.offset,
            error = %letter.error_message,
            attempts = letter.attempts,
            "Parking event added to Dead Letter Queue"
        );

        metrics::counter!("parking_dlq_added_total", "retryable" => letter.retryable.to_string())
            .increment(1);

        Ok(id)
    }

    /// List pending failed events, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the query fails.
    pub async fn list_pending(&self, limit: usize) -> Result<Vec<FailedParkingEvent>, DeadLetterError> {
        self.list_by_status(DLQStatus::Pending, limit).await
    }

    /// List failed events by status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the query fails.
    pub async fn list_by_status(
        &self,
        status: DLQStatus,
        limit: usize,
    ) -> Result<Vec<FailedParkingEvent>, DeadLetterError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE status = $1 ORDER BY failed_at ASC LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

        rows.iter().map(Self::row_to_failed_event).collect()
    }

    /// Get a specific failed event by ID.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the query fails or entry not found.
    pub async fn get_by_id(&self, id: i64) -> Result<FailedParkingEvent, DeadLetterError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

        Self::row_to_failed_event(&row)
    }

    /// Update the status of a failed event.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the update fails.
    pub async fn update_status(&self, id: i64, status: DLQStatus) -> Result<(), DeadLetterError> {
        sqlx::query("UPDATE failed_parking_events SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

        tracing::info!(dlq_id = id, status = status.as_str(), "DLQ entry status updated");

        Ok(())
    }

    /// Mark a failed event as resolved.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the update fails.
    pub async fn mark_resolved(
        &self,
        id: i64,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> Result<(), DeadLetterError> {
        sqlx::query(
            r"
            UPDATE failed_parking_events
            SET status = 'resolved',
                resolved_at = NOW(),
                resolved_by = $1,
                resolution_notes = $2
            WHERE id = $3
            ",
        )
        .bind(resolved_by)
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

        tracing::info!(dlq_id = id, resolved_by, "DLQ entry marked as resolved");

        metrics::counter!("parking_dlq_resolved_total").increment(1);

        Ok(())
    }

    /// Get count of pending failures.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the query fails.
    pub async fn count_pending(&self) -> Result<i64, DeadLetterError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM failed_parking_events WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

        Ok(count)
    }

    fn row_to_failed_event(row: &sqlx::postgres::PgRow) -> Result<FailedParkingEvent, DeadLetterError> {
        let storage = |e: sqlx::Error| DeadLetterError::Storage(e.to_string());

        let status: String = row.try_get("status").map_err(storage)?;
        let event_type: Option<String> = row.try_get("event_type").map_err(storage)?;
        let attempts: i32 = row.try_get("attempts").map_err(storage)?;

        Ok(FailedParkingEvent {
            id: row.try_get("id").map_err(storage)?,
            letter: DeadLetter {
                topic: row.try_get("topic").map_err(storage)?,
                partition: row.try_get("partition_id").map_err(storage)?,
                offset: row.try_get("message_offset").map_err(storage)?,
                key: row.try_get("message_key").map_err(storage)?,
                payload: row.try_get("payload").map_err(storage)?,
                parking_id: row.try_get("parking_id").map_err(storage)?,
                event_type: event_type.as_deref().and_then(ParkingEventType::parse),
                error_message: row.try_get("error_message").map_err(storage)?,
                retryable: row.try_get("retryable").map_err(storage)?,
                attempts: u32::try_from(attempts).unwrap_or_default(),
                failed_at: row.try_get("failed_at").map_err(storage)?,
            },
            status: DLQStatus::parse(&status)?,
            resolved_at: row.try_get("resolved_at").map_err(storage)?,
            resolved_by: row.try_get("resolved_by").map_err(storage)?,
            resolution_notes: row.try_get("resolution_notes").map_err(storage)?,
        })
    }
}

impl DeadLetterSink for DeadLetterQueue {
    fn record(
        &self,
        letter: DeadLetter,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterError>> + Send + '_>> {
        Box::pin(async move { self.add_entry(&letter).await.map(|_| ()) })
    }
}
