//! Aggregate root abstraction.

use uuid::Uuid;

use crate::clock::Clock;
use crate::command::Command;
use crate::correlation::CorrelationId;
use crate::event::DomainEvent;

/// Trait for aggregate roots that reconstitute from event history.
///
/// Deciding (`handle`) and evolving (`apply`) are kept apart: `handle` never
/// mutates state, and `apply` never rejects.
pub trait AggregateRoot: Send + Sync {
    /// The command type this aggregate validates.
    type Command: Command;

    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Business-rule rejection returned by `handle`.
    type Rejection: std::error::Error + Send + Sync;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the current version (number of events applied).
    fn version(&self) -> i64;

    /// Validates a command against current state and produces the event it
    /// results in. Leaves the aggregate untouched.
    ///
    /// # Errors
    ///
    /// Returns `Self::Rejection` when the command violates a business rule.
    fn handle(
        &self,
        command: &Self::Command,
        correlation_id: CorrelationId,
        clock: &dyn Clock,
    ) -> Result<Self::Event, Self::Rejection>;

    /// Apply an event to mutate internal state. Increments the version by one.
    fn apply(&mut self, event: &Self::Event);
}
