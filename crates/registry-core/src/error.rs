//! Domain and transport error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
///
/// These are structural faults: they abort the in-flight command and are never
/// turned into channel messages.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// A validation error in request or domain input.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

/// Errors raised by the command and event transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A subscription could not be created.
    #[error("failed to subscribe to {scope}: {reason}")]
    SubscriptionFailed {
        /// The channel scope that was requested.
        scope: String,
        /// Underlying cause.
        reason: String,
    },

    /// The scope already has an active subscription.
    #[error("scope {0} already has an active subscription")]
    SubscriptionActive(String),

    /// The subscription was already released.
    #[error("subscription on {0} is closed")]
    SubscriptionClosed(String),

    /// A producer could not be created.
    #[error("failed to create producer for {scope}: {reason}")]
    ProducerCreation {
        /// The channel scope that was requested.
        scope: String,
        /// Underlying cause.
        reason: String,
    },

    /// A message could not be published.
    #[error("failed to publish on {scope}: {reason}")]
    PublishFailed {
        /// The channel scope the message was destined for.
        scope: String,
        /// Underlying cause.
        reason: String,
    },

    /// A receive call failed.
    #[error("failed to receive on {scope}: {reason}")]
    ReceiveFailed {
        /// The channel scope being read.
        scope: String,
        /// Underlying cause.
        reason: String,
    },

    /// An acknowledgement or negative acknowledgement could not be recorded.
    #[error("acknowledgement failed: {0}")]
    Acknowledgement(String),

    /// The transport has shut down.
    #[error("transport closed")]
    Closed,
}
