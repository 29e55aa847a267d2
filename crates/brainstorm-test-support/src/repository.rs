//! Fake `EventRepository` implementations for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use brainstorm_core::error::DomainError;
use brainstorm_core::repository::{EventRepository, StoredEvent};
use uuid::Uuid;

/// One recorded `append_events` call: aggregate, expected version, events.
pub type AppendCall = (Uuid, i64, Vec<StoredEvent>);

/// An event repository that returns a canned stream from every
/// `load_events` call and records every `append_events` call.
///
/// Appends are not folded back into the canned stream, so each handler call
/// sees the same starting state.
#[derive(Debug)]
pub struct RecordingEventRepository {
    stream: Vec<StoredEvent>,
    appended: Mutex<Vec<AppendCall>>,
}

impl RecordingEventRepository {
    /// Create a recording repository that serves `stream` on every load.
    #[must_use]
    pub fn new(stream: Vec<StoredEvent>) -> Self {
        Self {
            stream,
            appended: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of all append calls, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<AppendCall> {
        self.appended.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.stream.clone())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        self.appended
            .lock()
            .unwrap()
            .push((aggregate_id, expected_version, events.to_vec()));
        Ok(())
    }
}

/// An event repository that always returns an empty event list and silently
/// accepts appends. Useful for "room not found" scenarios and room creation.
#[derive(Debug)]
pub struct EmptyEventRepository;

#[async_trait]
impl EventRepository for EmptyEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Ok(())
    }
}

/// An event repository whose store is never reachable.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::StoreUnavailable("connection refused".into()))
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Err(DomainError::StoreUnavailable("connection refused".into()))
    }
}

/// Wraps another repository and rejects the first `failures` appends with
/// `StoreUnavailable`. Loads always pass through.
pub struct FlakyEventRepository {
    inner: Arc<dyn EventRepository>,
    failures: usize,
    append_attempts: AtomicUsize,
}

impl FlakyEventRepository {
    /// Fail the first `failures` append calls, then delegate to `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn EventRepository>, failures: usize) -> Self {
        Self {
            inner,
            failures,
            append_attempts: AtomicUsize::new(0),
        }
    }

    /// Number of `append_events` calls seen so far, failed ones included.
    pub fn append_attempts(&self) -> usize {
        self.append_attempts.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for FlakyEventRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlakyEventRepository")
            .field("failures", &self.failures)
            .field("append_attempts", &self.append_attempts())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventRepository for FlakyEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        self.inner.load_events(aggregate_id).await
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let attempt = self.append_attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(DomainError::StoreUnavailable(format!(
                "simulated outage on append attempt {}",
                attempt + 1
            )));
        }
        self.inner
            .append_events(aggregate_id, expected_version, events)
            .await
    }
}

/// Wraps another repository and yields to the scheduler after every load, so
/// handlers joined on one task all read the stream before any of them
/// appends. Counts the version conflicts the inner repository reports.
pub struct InterleavingEventRepository {
    inner: Arc<dyn EventRepository>,
    conflicts: AtomicUsize,
}

impl InterleavingEventRepository {
    /// Delegate to `inner`, yielding after each load.
    #[must_use]
    pub fn new(inner: Arc<dyn EventRepository>) -> Self {
        Self {
            inner,
            conflicts: AtomicUsize::new(0),
        }
    }

    /// Number of appends rejected with `ConcurrencyConflict`.
    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for InterleavingEventRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterleavingEventRepository")
            .field("conflicts", &self.conflicts())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventRepository for InterleavingEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let events = self.inner.load_events(aggregate_id).await?;
        tokio::task::yield_now().await;
        Ok(events)
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let result = self
            .inner
            .append_events(aggregate_id, expected_version, events)
            .await;
        if matches!(result, Err(DomainError::ConcurrencyConflict { .. })) {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}
