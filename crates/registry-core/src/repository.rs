//! Event repository abstraction.

use async_trait::async_trait;
use uuid::Uuid;

use crate::correlation::CorrelationId;
use crate::error::DomainError;

/// Stored representation of a domain event.
///
/// Every event kind is stored uniformly: the `event_type` discriminator plus
/// the variant payload as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate root this event belongs to.
    pub aggregate_root_id: Uuid,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Version within the aggregate stream.
    pub version: i64,
    /// Correlation ID of the producing command.
    pub correlation_id: CorrelationId,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

/// Repository trait for loading and appending domain events.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Load the events of an aggregate whose version is greater than
    /// `starting_version`, ordered ascending by version.
    async fn load_events_since(
        &self,
        aggregate_root_id: Uuid,
        starting_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// Load all events for a given aggregate, ordered by version.
    async fn load_events(&self, aggregate_root_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        self.load_events_since(aggregate_root_id, 0).await
    }

    /// Load the events an aggregate recorded for one dispatched command,
    /// ordered by version.
    async fn load_events_by_correlation_id(
        &self,
        aggregate_root_id: Uuid,
        correlation_id: CorrelationId,
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// Append new events to an aggregate stream with optimistic concurrency.
    /// `expected_version` is the last known version; the batch is rejected
    /// with `DomainError::ConcurrencyConflict` if the stream has moved on.
    async fn append_events(
        &self,
        aggregate_root_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError>;
}
