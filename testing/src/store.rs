use crate::{FixedClock, test_clock};
use parksync_core::environment::Clock;
use parksync_core::{ParkingSession, SessionStore, StoreError, StoreFuture};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, ParkingSession>,
    writes: usize,
    write_fault: Option<StoreError>,
    read_fault: Option<StoreError>,
}

/// In-memory session store for testing
///
/// Stores sessions in a `HashMap` keyed by internal id. Writes stamp
/// `created_at` / `updated_at` from a fixed clock. Read and write faults can be
/// injected to exercise the compensation and retry paths.
#[derive(Debug, Clone)]
pub struct InMemorySessionStore {
    inner: Arc<Mutex<Inner>>,
    clock: FixedClock,
}

impl InMemorySessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock: test_clock(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a record in place without counting it as a write
    pub fn seed(&self, session: ParkingSession) {
        self.lock()
            .sessions
            .insert(session.internal_id.clone(), session);
    }

    /// Current record for an internal id
    #[must_use]
    pub fn get(&self, internal_id: &str) -> Option<ParkingSession> {
        self.lock().sessions.get(internal_id).cloned()
    }

    /// Number of records held
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Whether no record is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful `insert` / `upsert` calls
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Make every subsequent write fail with `error`
    pub fn fail_writes_with(&self, error: StoreError) {
        self.lock().write_fault = Some(error);
    }

    /// Make every subsequent `find` fail with `error`
    pub fn fail_reads_with(&self, error: StoreError) {
        self.lock().read_fault = Some(error);
    }

    /// Remove injected faults
    pub fn heal(&self) {
        let mut inner = self.lock();
        inner.write_fault = None;
        inner.read_fault = None;
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for InMemorySessionStore {
    fn find(&self, internal_id: &str) -> StoreFuture<'_, Option<ParkingSession>> {
        let result = {
            let inner = self.lock();
            match &inner.read_fault {
                Some(error) => Err(error.clone()),
                None => Ok(inner.sessions.get(internal_id).cloned()),
            }
        };
        Box::pin(async move { result })
    }

    fn insert(&self, mut session: ParkingSession) -> StoreFuture<'_, ParkingSession> {
        let now = self.clock.now();
        let result = {
            let mut inner = self.lock();
            if let Some(error) = &inner.write_fault {
                Err(error.clone())
            } else if inner.sessions.contains_key(&session.internal_id) {
                Err(StoreError::Conflict(session.internal_id))
            } else {
                session.created_at = Some(now);
                session.updated_at = Some(now);
                inner.writes += 1;
                inner
                    .sessions
                    .insert(session.internal_id.clone(), session.clone());
                Ok(session)
            }
        };
        Box::pin(async move { result })
    }

    fn upsert(&self, mut session: ParkingSession) -> StoreFuture<'_, ParkingSession> {
        let now = self.clock.now();
        let result = {
            let mut inner = self.lock();
            if let Some(error) = &inner.write_fault {
                Err(error.clone())
            } else {
                let created_at = inner
                    .sessions
                    .get(&session.internal_id)
                    .and_then(|existing| existing.created_at)
                    .unwrap_or(now);
                session.created_at = Some(created_at);
                session.updated_at = Some(now);
                inner.writes += 1;
                inner
                    .sessions
                    .insert(session.internal_id.clone(), session.clone());
                Ok(session)
            }
        };
        Box::pin(async move { result })
    }
}
