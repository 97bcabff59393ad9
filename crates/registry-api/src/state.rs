//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use registry_core::repository::EventRepository;
use registry_core::transport::{CommandPublisher, EventTransport};
use uuid::Uuid;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The registry aggregate this server manages.
    pub registry_id: Uuid,
    /// Where dispatched commands go.
    pub command_publisher: Arc<dyn CommandPublisher>,
    /// Where result streams subscribe.
    pub event_transport: Arc<dyn EventTransport>,
    /// Read side for registry queries.
    pub event_repository: Arc<dyn EventRepository>,
    /// Silence that completes a result stream.
    pub quiet_timeout: Duration,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        registry_id: Uuid,
        command_publisher: Arc<dyn CommandPublisher>,
        event_transport: Arc<dyn EventTransport>,
        event_repository: Arc<dyn EventRepository>,
        quiet_timeout: Duration,
    ) -> Self {
        Self {
            registry_id,
            command_publisher,
            event_transport,
            event_repository,
            quiet_timeout,
        }
    }
}
