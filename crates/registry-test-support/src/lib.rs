//! Shared test doubles for the product registry.

mod clock;
mod repository;
mod transport;

pub use clock::FixedClock;
pub use repository::{
    EmptyEventRepository, FailingEventRepository, InMemoryEventRepository,
    RecordingEventRepository,
};
pub use transport::{
    FailingCommandPublisher, FailingEventTransport, RecordingCommandPublisher,
    RecordingEventTransport, ScriptStep, ScriptedSubscription, SubscriptionProbe,
};
