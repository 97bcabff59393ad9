//! Command and event transport abstractions.
//!
//! The command transport carries commands from the caller-facing layer to the
//! command consumer, with acknowledgement and redelivery. The event transport
//! carries each command's outcome on a channel scoped to its correlation id.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::correlation::{CORRELATION_ID_PROPERTY, CorrelationId};
use crate::error::TransportError;

/// Broker-assigned identifier of a delivered message.
pub type MessageId = u64;

/// A command ready to be published, with its transport metadata.
#[derive(Debug, Clone)]
pub struct OutgoingCommand {
    /// Metadata properties attached to the message.
    pub properties: HashMap<String, String>,
    /// Encoded command body.
    pub payload: Vec<u8>,
}

impl OutgoingCommand {
    /// Builds an outgoing command tagged with `correlation_id`.
    #[must_use]
    pub fn new(correlation_id: CorrelationId, payload: Vec<u8>) -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            CORRELATION_ID_PROPERTY.to_owned(),
            correlation_id.to_string(),
        );
        Self {
            properties,
            payload,
        }
    }
}

/// A command handed to the consumer. Must be acknowledged or negatively
/// acknowledged through the receiver it came from.
#[derive(Debug, Clone)]
pub struct CommandDelivery {
    /// Identifier used to ack/nack this delivery.
    pub delivery_id: MessageId,
    /// How many times this message was delivered before.
    pub redelivery_count: u32,
    /// Metadata properties attached by the publisher.
    pub properties: HashMap<String, String>,
    /// Encoded command body.
    pub payload: Vec<u8>,
}

impl CommandDelivery {
    /// Returns the raw `correlation-id` metadata property, if present.
    #[must_use]
    pub fn correlation_property(&self) -> Option<&str> {
        self.properties
            .get(CORRELATION_ID_PROPERTY)
            .map(String::as_str)
    }
}

/// A message received on a correlation-scoped channel.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// Identifier used to acknowledge this message.
    pub message_id: MessageId,
    /// Encoded channel message.
    pub payload: Vec<u8>,
}

/// Publishing side of the command transport.
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    /// Publishes a command.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the command could not be enqueued.
    async fn publish(&self, command: OutgoingCommand) -> Result<(), TransportError>;
}

/// Consuming side of the command transport.
#[async_trait]
pub trait CommandReceiver: Send {
    /// Waits for the next command. `Ok(None)` means the transport closed.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` on a broker failure.
    async fn receive(&mut self) -> Result<Option<CommandDelivery>, TransportError>;

    /// Marks a delivery as processed.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Acknowledgement` for an unknown delivery.
    async fn acknowledge(&mut self, delivery_id: MessageId) -> Result<(), TransportError>;

    /// Marks a delivery as failed, making it eligible for redelivery.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Acknowledgement` for an unknown delivery.
    async fn negative_acknowledge(
        &mut self,
        delivery_id: MessageId,
        reason: &str,
    ) -> Result<(), TransportError>;
}

/// A subscription to exactly one correlation-scoped channel.
///
/// Owned by a single request; never shared.
#[async_trait]
pub trait EventSubscription: Send {
    /// The channel scope this subscription reads.
    fn scope(&self) -> &str;

    /// Waits up to `timeout` for the next message. `Ok(None)` means nothing
    /// arrived in time.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` on a transport-level receive failure.
    async fn receive(&mut self, timeout: Duration)
    -> Result<Option<ReceivedMessage>, TransportError>;

    /// Acknowledges a received message.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the acknowledgement could not be recorded.
    async fn acknowledge(&mut self, message_id: MessageId) -> Result<(), TransportError>;

    /// Releases the subscription and its channel.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the subscription was already released or
    /// the broker refused.
    async fn unsubscribe(&mut self) -> Result<(), TransportError>;
}

/// A transient producer bound to one correlation-scoped channel.
#[async_trait]
pub trait EventProducer: Send {
    /// Sends one encoded message.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::PublishFailed` if the message was not accepted.
    async fn send(&mut self, payload: Vec<u8>) -> Result<MessageId, TransportError>;

    /// Closes the producer.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the producer could not be closed cleanly.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Per-correlation event transport.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Opens an exclusive subscription to the channel for `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the subscription could not be created. No
    /// subscription is left open in that case.
    async fn subscribe(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Box<dyn EventSubscription>, TransportError>;

    /// Creates a producer for the channel for `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ProducerCreation` on failure.
    async fn create_producer(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Box<dyn EventProducer>, TransportError>;
}
