//! Test repositories — `EventRepository` doubles.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use registry_core::correlation::CorrelationId;
use registry_core::error::DomainError;
use registry_core::repository::{EventRepository, StoredEvent};
use uuid::Uuid;

/// An event repository that returns a fixed history from every load and
/// records every append. Appends always succeed.
#[derive(Debug)]
pub struct RecordingEventRepository {
    history: Vec<StoredEvent>,
    appended: Mutex<Vec<(Uuid, i64, Vec<StoredEvent>)>>,
}

impl RecordingEventRepository {
    /// Creates a repository whose loads return `history`.
    #[must_use]
    pub fn new(history: Vec<StoredEvent>) -> Self {
        Self {
            history,
            appended: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of all appends as `(aggregate, expected_version, events)`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<(Uuid, i64, Vec<StoredEvent>)> {
        self.appended.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn load_events_since(
        &self,
        _aggregate_root_id: Uuid,
        starting_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self
            .history
            .iter()
            .filter(|e| e.version > starting_version)
            .cloned()
            .collect())
    }

    async fn load_events_by_correlation_id(
        &self,
        _aggregate_root_id: Uuid,
        correlation_id: CorrelationId,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self
            .history
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .cloned()
            .collect())
    }

    async fn append_events(
        &self,
        aggregate_root_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        self.appended
            .lock()
            .unwrap()
            .push((aggregate_root_id, expected_version, events.to_vec()));
        Ok(())
    }
}

/// An event repository with no history that silently accepts appends.
#[derive(Debug)]
pub struct EmptyEventRepository;

#[async_trait]
impl EventRepository for EmptyEventRepository {
    async fn load_events_since(
        &self,
        _aggregate_root_id: Uuid,
        _starting_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn load_events_by_correlation_id(
        &self,
        _aggregate_root_id: Uuid,
        _correlation_id: CorrelationId,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn append_events(
        &self,
        _aggregate_root_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Ok(())
    }
}

/// An event repository that always returns an infrastructure error.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events_since(
        &self,
        _aggregate_root_id: Uuid,
        _starting_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn load_events_by_correlation_id(
        &self,
        _aggregate_root_id: Uuid,
        _correlation_id: CorrelationId,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_events(
        &self,
        _aggregate_root_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

#[derive(Debug, Default)]
struct Streams {
    events: HashMap<Uuid, Vec<StoredEvent>>,
    failing_appends: usize,
    since_calls: Vec<i64>,
}

/// An in-memory event store with real expected-version checks.
///
/// `fail_next_appends` makes the next appends fail with an infrastructure
/// error, for exercising redelivery paths.
#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    streams: Mutex<Streams>,
}

impl InMemoryEventRepository {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` appends fail before touching the store.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_next_appends(&self, count: usize) {
        self.streams.lock().unwrap().failing_appends = count;
    }

    /// Writes events directly, bypassing version checks.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed(&self, aggregate_root_id: Uuid, events: Vec<StoredEvent>) {
        self.streams
            .lock()
            .unwrap()
            .events
            .entry(aggregate_root_id)
            .or_default()
            .extend(events);
    }

    /// All events of one aggregate, in version order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn events(&self, aggregate_root_id: Uuid) -> Vec<StoredEvent> {
        self.streams
            .lock()
            .unwrap()
            .events
            .get(&aggregate_root_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The `starting_version` of every `load_events_since` call so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn since_calls(&self) -> Vec<i64> {
        self.streams.lock().unwrap().since_calls.clone()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn load_events_since(
        &self,
        aggregate_root_id: Uuid,
        starting_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let mut streams = self.streams.lock().unwrap();
        streams.since_calls.push(starting_version);
        Ok(streams
            .events
            .get(&aggregate_root_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.version > starting_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn load_events_by_correlation_id(
        &self,
        aggregate_root_id: Uuid,
        correlation_id: CorrelationId,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self
            .events(aggregate_root_id)
            .into_iter()
            .filter(|e| e.correlation_id == correlation_id)
            .collect())
    }

    async fn append_events(
        &self,
        aggregate_root_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let mut streams = self.streams.lock().unwrap();
        if streams.failing_appends > 0 {
            streams.failing_appends -= 1;
            return Err(DomainError::Infrastructure("connection refused".into()));
        }
        let stream = streams.events.entry(aggregate_root_id).or_default();
        let actual = stream.last().map_or(0, |e| e.version);
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: aggregate_root_id,
                expected: expected_version,
                actual,
            });
        }
        stream.extend_from_slice(events);
        Ok(())
    }
}
