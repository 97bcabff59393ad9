//! Per-correlation result channels: the subscription and the producer.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use registry_core::error::TransportError;
use registry_core::transport::{EventProducer, EventSubscription, MessageId, ReceivedMessage};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::broker::BrokerInner;

/// Exclusive subscription to one result channel.
///
/// Dropping the subscription without unsubscribing still releases the channel.
pub struct InMemorySubscription {
    broker: Arc<BrokerInner>,
    scope: String,
    receiver: Option<mpsc::UnboundedReceiver<ReceivedMessage>>,
    unacknowledged: BTreeSet<MessageId>,
}

impl InMemorySubscription {
    pub(crate) fn new(
        broker: Arc<BrokerInner>,
        scope: String,
        receiver: mpsc::UnboundedReceiver<ReceivedMessage>,
    ) -> Self {
        Self {
            broker,
            scope,
            receiver: Some(receiver),
            unacknowledged: BTreeSet::new(),
        }
    }
}

#[async_trait]
impl EventSubscription for InMemorySubscription {
    fn scope(&self) -> &str {
        &self.scope
    }

    async fn receive(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, TransportError> {
        let receiver = self
            .receiver
            .as_mut()
            .ok_or_else(|| TransportError::SubscriptionClosed(self.scope.clone()))?;

        match tokio::time::timeout(timeout, receiver.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Some(message)) => {
                self.unacknowledged.insert(message.message_id);
                Ok(Some(message))
            }
            Ok(None) => Err(TransportError::ReceiveFailed {
                scope: self.scope.clone(),
                reason: "channel closed by broker".to_owned(),
            }),
        }
    }

    async fn acknowledge(&mut self, message_id: MessageId) -> Result<(), TransportError> {
        if self.unacknowledged.remove(&message_id) {
            Ok(())
        } else {
            Err(TransportError::Acknowledgement(format!(
                "message {message_id} is not pending on {}",
                self.scope
            )))
        }
    }

    async fn unsubscribe(&mut self) -> Result<(), TransportError> {
        if self.receiver.take().is_none() {
            return Err(TransportError::SubscriptionClosed(self.scope.clone()));
        }
        if !self.unacknowledged.is_empty() {
            warn!(
                scope = %self.scope,
                pending = self.unacknowledged.len(),
                "unsubscribing with unacknowledged messages"
            );
        }
        self.broker.release_topic(&self.scope);
        Ok(())
    }
}

impl Drop for InMemorySubscription {
    fn drop(&mut self) {
        if self.receiver.take().is_some() {
            self.broker.release_topic(&self.scope);
        }
    }
}

/// Transient producer bound to one result channel.
pub struct InMemoryProducer {
    broker: Arc<BrokerInner>,
    scope: String,
    sender: Option<mpsc::UnboundedSender<ReceivedMessage>>,
}

impl InMemoryProducer {
    pub(crate) fn new(
        broker: Arc<BrokerInner>,
        scope: String,
        sender: mpsc::UnboundedSender<ReceivedMessage>,
    ) -> Self {
        Self {
            broker,
            scope,
            sender: Some(sender),
        }
    }

    fn publish_failed(&self, reason: &str) -> TransportError {
        TransportError::PublishFailed {
            scope: self.scope.clone(),
            reason: reason.to_owned(),
        }
    }
}

#[async_trait]
impl EventProducer for InMemoryProducer {
    async fn send(&mut self, payload: Vec<u8>) -> Result<MessageId, TransportError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| self.publish_failed("producer closed"))?;
        let message_id = self.broker.next_message_id();
        sender
            .send(ReceivedMessage {
                message_id,
                payload,
            })
            .map_err(|_| self.publish_failed("channel released"))?;
        debug!(scope = %self.scope, message_id, "sent result message");
        Ok(message_id)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sender.take().map(drop).ok_or(TransportError::Closed)
    }
}
