//! Publishes command outcomes on the channel of their correlation id.

use std::sync::Arc;

use registry_core::correlation::CorrelationId;
use registry_core::error::TransportError;
use registry_core::transport::{EventTransport, MessageId};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::errors::RegistryError;
use crate::domain::events::ProductRegistryEvent;
use crate::domain::messages::ChannelMessage;

/// Failure to deliver a command outcome.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The message could not be encoded.
    #[error("failed to encode channel message: {0}")]
    Encode(#[from] serde_json::Error),

    /// The transport refused the producer or the message.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Routes events and errors to per-correlation channels, one transient
/// producer per message.
#[derive(Clone)]
pub struct EventRouter {
    transport: Arc<dyn EventTransport>,
}

impl EventRouter {
    /// Creates a router over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        Self { transport }
    }

    /// Publishes a produced event.
    ///
    /// # Errors
    ///
    /// See [`EventRouter::route`].
    pub async fn route_event(
        &self,
        correlation_id: CorrelationId,
        event: &ProductRegistryEvent,
    ) -> Result<MessageId, RouteError> {
        self.route(
            correlation_id,
            &ChannelMessage::ProductRegistryEvent(event.clone()),
        )
        .await
    }

    /// Publishes a rejection.
    ///
    /// # Errors
    ///
    /// See [`EventRouter::route`].
    pub async fn route_error(
        &self,
        correlation_id: CorrelationId,
        error: &RegistryError,
    ) -> Result<MessageId, RouteError> {
        self.route(
            correlation_id,
            &ChannelMessage::ProductRegistryError(error.clone()),
        )
        .await
    }

    /// Publishes `message` on the channel for `correlation_id`. The producer
    /// is closed whether or not the send succeeded; a close failure after a
    /// successful send is only logged.
    ///
    /// # Errors
    ///
    /// Returns `RouteError` if encoding, producer creation or the send fails.
    pub async fn route(
        &self,
        correlation_id: CorrelationId,
        message: &ChannelMessage,
    ) -> Result<MessageId, RouteError> {
        let payload = message.encode()?;
        let mut producer = self.transport.create_producer(correlation_id).await?;
        let sent = producer.send(payload).await;
        let closed = producer.close().await;

        if let Err(err) = &closed {
            warn!(
                correlation_id = %correlation_id,
                error = %err,
                "failed to close result producer"
            );
        }
        let message_id = sent?;
        debug!(correlation_id = %correlation_id, message_id, "routed result");
        Ok(message_id)
    }
}
