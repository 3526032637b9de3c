use chrono::{DateTime, Utc};
use parksync_core::{ParkingSession, SessionStatus, SessionStore, StoreError, StoreFuture};
use sqlx::postgres::{PgPool, PgPoolOptions};

const COLUMNS: &str = "internal_id, external_id, license_plate, area_code, status, \
                       start_time, end_time, created_at, updated_at";

/// Row of the `parking_sessions` table.
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    internal_id: String,
    external_id: String,
    license_plate: String,
    area_code: String,
    status: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for ParkingSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<SessionStatus>()
            .map_err(|e| StoreError::Corrupt {
                internal_id: row.internal_id.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            internal_id: row.internal_id,
            external_id: row.external_id,
            license_plate: row.license_plate,
            area_code: row.area_code,
            start_time: row.start_time,
            end_time: row.end_time,
            status,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

/// `PostgreSQL`-backed [`SessionStore`].
#[derive(Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to connect: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Run the embedded migrations (`parking_sessions`, `failed_parking_events`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find_row(&self, internal_id: &str) -> Result<Option<ParkingSession>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM parking_sessions WHERE internal_id = $1"
        ))
        .bind(internal_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to load session: {e}")))?;

        row.map(ParkingSession::try_from).transpose()
    }

    async fn insert_row(&self, session: ParkingSession) -> Result<ParkingSession, StoreError> {
        let row: SessionRow = sqlx::query_as(&format!(
            "INSERT INTO parking_sessions
                (internal_id, external_id, license_plate, area_code, status, start_time, end_time)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        ))
        .bind(&session.internal_id)
        .bind(&session.external_id)
        .bind(&session.license_plate)
        .bind(&session.area_code)
        .bind(session.status.as_str())
        .bind(session.start_time)
        .bind(session.end_time)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return StoreError::Conflict(session.internal_id.clone());
                }
            }
            StoreError::DatabaseError(format!("Failed to insert session: {e}"))
        })?;

        tracing::debug!(
            internal_id = %row.internal_id,
            external_id = %row.external_id,
            "Parking session inserted"
        );
        ParkingSession::try_from(row)
    }

    async fn upsert_row(&self, session: ParkingSession) -> Result<ParkingSession, StoreError> {
        let row: SessionRow = sqlx::query_as(&format!(
            "INSERT INTO parking_sessions
                (internal_id, external_id, license_plate, area_code, status, start_time, end_time)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (internal_id) DO UPDATE
             SET end_time = EXCLUDED.end_time,
                 status = EXCLUDED.status,
                 updated_at = now()
             RETURNING {COLUMNS}"
        ))
        .bind(&session.internal_id)
        .bind(&session.external_id)
        .bind(&session.license_plate)
        .bind(&session.area_code)
        .bind(session.status.as_str())
        .bind(session.start_time)
        .bind(session.end_time)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to upsert session: {e}")))?;

        tracing::debug!(
            internal_id = %row.internal_id,
            status = %row.status,
            "Parking session updated"
        );
        ParkingSession::try_from(row)
    }
}

impl SessionStore for PostgresSessionStore {
    fn find(&self, internal_id: &str) -> StoreFuture<'_, Option<ParkingSession>> {
        let internal_id = internal_id.to_string();
        Box::pin(async move { self.find_row(&internal_id).await })
    }

    fn insert(&self, session: ParkingSession) -> StoreFuture<'_, ParkingSession> {
        Box::pin(self.insert_row(session))
    }

    fn upsert(&self, session: ParkingSession) -> StoreFuture<'_, ParkingSession> {
        Box::pin(self.upsert_row(session))
    }
}
