//! Turns a pull-style correlation subscription into a push-style output
//! stream.
//!
//! The bridge waits for messages with a quiet timeout. Silence completes the
//! stream, a rejection fails it, and events are forwarded as they arrive. The
//! subscription is released exactly once however the loop ends.

use std::time::Duration;

use chrono::{DateTime, Utc};
use registry_core::error::TransportError;
use registry_core::event::DomainEvent;
use registry_core::transport::{EventSubscription, MessageId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::emitter::{StreamEmitter, stream_channel};
use crate::domain::errors::RegistryError;
use crate::domain::events::{ProductRegistryEvent, ProductRegistryEventKind};
use crate::domain::messages::ChannelMessage;
use crate::domain::product::ProductId;

/// Default quiet timeout.
pub const DEFAULT_QUIET_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Externally shaped event, as handed to the output stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductEventView {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Event type name.
    pub event_type: String,
    /// The registry the event belongs to.
    pub registry_id: Uuid,
    /// Registry version after the event.
    pub version: i64,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// The product concerned.
    pub product_id: ProductId,
    /// New name; absent for removals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description; absent for removals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&ProductRegistryEvent> for ProductEventView {
    fn from(event: &ProductRegistryEvent) -> Self {
        let (name, description) = match &event.kind {
            ProductRegistryEventKind::ProductRegistered(p) => {
                (Some(p.name.clone()), Some(p.description.clone()))
            }
            ProductRegistryEventKind::ProductUpdated(p) => {
                (Some(p.name.clone()), Some(p.description.clone()))
            }
            ProductRegistryEventKind::ProductRemoved(_) => (None, None),
        };
        let meta = event.metadata();
        Self {
            event_id: meta.event_id,
            event_type: event.event_type().to_owned(),
            registry_id: meta.aggregate_root_id,
            version: meta.version,
            timestamp: meta.occurred_at,
            product_id: event.kind.product_id().clone(),
            name,
            description,
        }
    }
}

/// What the caller's output stream carries.
pub type BridgeItem = Result<ProductEventView, RegistryError>;

/// How a bridge run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    /// Nothing arrived within the quiet timeout.
    Completed,
    /// A rejection arrived and was handed to the output.
    Rejected,
    /// The transport, decoding or the hand-off failed.
    Failed,
    /// The output stream was dropped.
    Cancelled,
}

/// Failures that end a bridge run.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Receiving or acknowledging failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message was not a channel message.
    #[error("message {message_id} could not be decoded: {source}")]
    Decode {
        /// The offending message.
        message_id: MessageId,
        /// Underlying cause.
        #[source]
        source: serde_json::Error,
    },

    /// The output stream refused an event.
    #[error("output stream closed before message {0} was handed off")]
    HandOff(MessageId),
}

impl From<&BridgeError> for RegistryError {
    fn from(err: &BridgeError) -> Self {
        let code = match err {
            BridgeError::Transport(_) => "transport_error",
            BridgeError::Decode { .. } => "invalid_message",
            BridgeError::HandOff(_) => "stream_closed",
        };
        Self {
            code: code.to_owned(),
            message: err.to_string(),
        }
    }
}

type EventCallback = Box<dyn Fn(&ProductRegistryEvent) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&BridgeError) + Send + Sync>;
type TerminationCallback = Box<dyn FnOnce(BridgeExit) + Send + Sync>;

/// Correlation bridge for one subscription.
pub struct CorrelationBridge {
    quiet_timeout: Duration,
    on_event: Option<EventCallback>,
    on_error: Option<ErrorCallback>,
    on_termination: Option<TerminationCallback>,
}

impl Default for CorrelationBridge {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_TIMEOUT)
    }
}

impl CorrelationBridge {
    /// Creates a bridge that treats `quiet_timeout` of silence as completion.
    #[must_use]
    pub fn new(quiet_timeout: Duration) -> Self {
        Self {
            quiet_timeout,
            on_event: None,
            on_error: None,
            on_termination: None,
        }
    }

    /// Called for every event before it is emitted.
    #[must_use]
    pub fn on_event(
        mut self,
        callback: impl Fn(&ProductRegistryEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Box::new(callback));
        self
    }

    /// Called when the run ends in failure.
    #[must_use]
    pub fn on_error(mut self, callback: impl Fn(&BridgeError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Called once, after the subscription is released.
    #[must_use]
    pub fn on_termination(
        mut self,
        callback: impl FnOnce(BridgeExit) + Send + Sync + 'static,
    ) -> Self {
        self.on_termination = Some(Box::new(callback));
        self
    }

    /// Runs the bridge on its own task and returns the output stream.
    pub fn spawn(
        self,
        subscription: Box<dyn EventSubscription>,
        capacity: usize,
    ) -> (JoinHandle<BridgeExit>, ReceiverStream<BridgeItem>) {
        let (emitter, stream) = stream_channel(capacity.max(1));
        let handle = tokio::spawn(self.run(subscription, emitter));
        (handle, stream)
    }

    /// Pumps `subscription` into `emitter` until completion, failure or
    /// cancellation, then releases the subscription and closes the output.
    pub async fn run(
        mut self,
        mut subscription: Box<dyn EventSubscription>,
        emitter: StreamEmitter<ProductEventView, RegistryError>,
    ) -> BridgeExit {
        let exit = self.pump(subscription.as_mut(), &emitter).await;

        let scope = subscription.scope().to_owned();
        if let Err(err) = subscription.unsubscribe().await {
            warn!(scope = %scope, error = %err, "failed to release subscription");
        }
        emitter.complete();

        info!(scope = %scope, exit = ?exit, "correlation stream finished");
        if let Some(callback) = self.on_termination.take() {
            callback(exit);
        }
        exit
    }

    async fn pump(
        &self,
        subscription: &mut dyn EventSubscription,
        emitter: &StreamEmitter<ProductEventView, RegistryError>,
    ) -> BridgeExit {
        loop {
            if emitter.is_cancelled() {
                return BridgeExit::Cancelled;
            }

            let received = tokio::select! {
                () = emitter.cancelled() => return BridgeExit::Cancelled,
                received = subscription.receive(self.quiet_timeout) => received,
            };

            let message = match received {
                Ok(Some(message)) => message,
                Ok(None) => return BridgeExit::Completed,
                Err(err) => return self.fail(emitter, BridgeError::Transport(err)).await,
            };

            let decoded = match ChannelMessage::decode(&message.payload) {
                Ok(decoded) => decoded,
                Err(source) => {
                    let err = BridgeError::Decode {
                        message_id: message.message_id,
                        source,
                    };
                    return self.fail(emitter, err).await;
                }
            };

            match decoded {
                ChannelMessage::ProductRegistryError(error) => {
                    debug!(code = %error.code, "forwarding rejection");
                    if emitter.fail(error).await.is_err() {
                        return BridgeExit::Cancelled;
                    }
                    if let Err(err) = subscription.acknowledge(message.message_id).await {
                        self.report(&BridgeError::Transport(err));
                        return BridgeExit::Failed;
                    }
                    return BridgeExit::Rejected;
                }
                ChannelMessage::ProductRegistryEvent(event) => {
                    if let Some(callback) = &self.on_event {
                        callback(&event);
                    }
                    if emitter.emit(ProductEventView::from(&event)).await.is_err() {
                        self.report(&BridgeError::HandOff(message.message_id));
                        return BridgeExit::Failed;
                    }
                    debug!(
                        event_type = event.event_type(),
                        version = event.metadata.version,
                        "forwarded event"
                    );
                    if let Err(err) = subscription.acknowledge(message.message_id).await {
                        return self.fail(emitter, BridgeError::Transport(err)).await;
                    }
                }
            }
        }
    }

    fn report(&self, err: &BridgeError) {
        warn!(error = %err, "correlation stream failed");
        if let Some(callback) = &self.on_error {
            callback(err);
        }
    }

    async fn fail(
        &self,
        emitter: &StreamEmitter<ProductEventView, RegistryError>,
        err: BridgeError,
    ) -> BridgeExit {
        self.report(&err);
        // The consumer may already be gone; the run fails either way.
        let _ = emitter.fail(RegistryError::from(&err)).await;
        BridgeExit::Failed
    }
}
