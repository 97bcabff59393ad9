//! Consuming end of the command queue.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use registry_core::error::TransportError;
use registry_core::transport::{CommandDelivery, CommandReceiver, MessageId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::broker::BrokerInner;

/// The single command consumer's receiver.
///
/// Deliveries stay in flight until acknowledged. A negative acknowledgement
/// puts the command back on the queue until `max_redeliveries` is exceeded,
/// after which it is dead-lettered.
pub struct InMemoryCommandReceiver {
    broker: Arc<BrokerInner>,
    receiver: mpsc::UnboundedReceiver<CommandDelivery>,
    in_flight: HashMap<MessageId, CommandDelivery>,
}

impl InMemoryCommandReceiver {
    pub(crate) fn new(
        broker: Arc<BrokerInner>,
        receiver: mpsc::UnboundedReceiver<CommandDelivery>,
    ) -> Self {
        Self {
            broker,
            receiver,
            in_flight: HashMap::new(),
        }
    }

    fn take_in_flight(
        &mut self,
        delivery_id: MessageId,
    ) -> Result<CommandDelivery, TransportError> {
        self.in_flight.remove(&delivery_id).ok_or_else(|| {
            TransportError::Acknowledgement(format!("delivery {delivery_id} is not in flight"))
        })
    }
}

#[async_trait]
impl CommandReceiver for InMemoryCommandReceiver {
    async fn receive(&mut self) -> Result<Option<CommandDelivery>, TransportError> {
        let Some(delivery) = self.receiver.recv().await else {
            return Ok(None);
        };
        self.in_flight.insert(delivery.delivery_id, delivery.clone());
        Ok(Some(delivery))
    }

    async fn acknowledge(&mut self, delivery_id: MessageId) -> Result<(), TransportError> {
        self.take_in_flight(delivery_id)?;
        debug!(delivery_id, "acknowledged command");
        Ok(())
    }

    async fn negative_acknowledge(
        &mut self,
        delivery_id: MessageId,
        reason: &str,
    ) -> Result<(), TransportError> {
        let mut delivery = self.take_in_flight(delivery_id)?;
        if delivery.redelivery_count >= self.broker.config.max_redeliveries {
            self.broker.dead_letter(delivery, reason);
            return Ok(());
        }

        delivery.redelivery_count += 1;
        debug!(
            delivery_id,
            redelivery_count = delivery.redelivery_count,
            reason,
            "redelivering command"
        );
        if let Err(delivery) = self.broker.enqueue_command(delivery) {
            self.broker.dead_letter(delivery, "command queue shut down");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use registry_core::correlation::CorrelationId;
    use registry_core::transport::{CommandPublisher, OutgoingCommand};

    use crate::{BrokerConfig, InMemoryBroker};

    use super::*;

    async fn publish_one(broker: &InMemoryBroker) {
        broker
            .publish(OutgoingCommand::new(CorrelationId::new(), b"cmd".to_vec()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_nack_redelivers_with_incremented_count() {
        // Arrange
        let broker = InMemoryBroker::default();
        let mut receiver = broker.command_receiver().unwrap();
        publish_one(&broker).await;
        let first = receiver.receive().await.unwrap().unwrap();

        // Act
        receiver
            .negative_acknowledge(first.delivery_id, "store unavailable")
            .await
            .unwrap();
        let second = receiver.receive().await.unwrap().unwrap();

        // Assert
        assert_eq!(second.redelivery_count, 1);
        assert_eq!(second.payload, first.payload);
        assert!(broker.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_command_is_dead_lettered_after_max_redeliveries() {
        // Arrange
        let broker = InMemoryBroker::new(BrokerConfig {
            max_redeliveries: 1,
            ..BrokerConfig::default()
        });
        let mut receiver = broker.command_receiver().unwrap();
        publish_one(&broker).await;

        // Act
        let first = receiver.receive().await.unwrap().unwrap();
        receiver
            .negative_acknowledge(first.delivery_id, "boom")
            .await
            .unwrap();
        let second = receiver.receive().await.unwrap().unwrap();
        receiver
            .negative_acknowledge(second.delivery_id, "boom")
            .await
            .unwrap();

        // Assert
        let dead = broker.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].redelivery_count, 1);
    }

    #[tokio::test]
    async fn test_acknowledge_unknown_delivery_fails() {
        let broker = InMemoryBroker::default();
        let mut receiver = broker.command_receiver().unwrap();

        let result = receiver.acknowledge(42).await;

        assert!(matches!(result, Err(TransportError::Acknowledgement(_))));
    }

    #[tokio::test]
    async fn test_acknowledged_delivery_cannot_be_acknowledged_again() {
        let broker = InMemoryBroker::default();
        let mut receiver = broker.command_receiver().unwrap();
        publish_one(&broker).await;
        let delivery = receiver.receive().await.unwrap().unwrap();

        receiver.acknowledge(delivery.delivery_id).await.unwrap();

        assert!(receiver.acknowledge(delivery.delivery_id).await.is_err());
    }

    #[tokio::test]
    async fn test_receive_drains_queue_then_ends_after_shutdown() {
        // Arrange
        let broker = InMemoryBroker::default();
        let mut receiver = broker.command_receiver().unwrap();
        publish_one(&broker).await;

        // Act
        broker.shutdown();

        // Assert
        assert!(receiver.receive().await.unwrap().is_some());
        assert!(receiver.receive().await.unwrap().is_none());
    }
}
