//! The receive loop on the command transport.

use std::sync::Arc;

use registry_core::correlation::CorrelationId;
use registry_core::error::{DomainError, TransportError};
use registry_core::transport::{CommandDelivery, CommandReceiver};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::application::command_handlers::{CommandOutcome, RegistryCommandHandler};
use crate::application::event_router::{EventRouter, RouteError};
use crate::domain::commands::ProductRegistryCommand;

/// Errors that stop the consumer or abort one delivery.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The command transport failed (receive, ack or nack).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Loading, deciding or persisting failed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The outcome could not be published.
    #[error(transparent)]
    Route(#[from] RouteError),
}

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Applied and routed; acknowledged.
    Applied,
    /// Rejected and the error routed; acknowledged.
    Rejected,
    /// A redelivery whose events were already recorded; re-routed and
    /// acknowledged.
    Replayed,
    /// Unusable message; acknowledged and dropped.
    Poisoned,
    /// Processing failed; negatively acknowledged with this reason.
    Retried(String),
}

/// Consumes commands for one registry and routes each outcome to its
/// correlation channel.
pub struct CommandConsumer {
    registry_id: Uuid,
    handler: Arc<RegistryCommandHandler>,
    router: EventRouter,
}

impl CommandConsumer {
    /// Creates a consumer for the registry `registry_id`.
    #[must_use]
    pub fn new(
        registry_id: Uuid,
        handler: Arc<RegistryCommandHandler>,
        router: EventRouter,
    ) -> Self {
        Self {
            registry_id,
            handler,
            router,
        }
    }

    /// Processes deliveries until the transport closes or `shutdown` turns
    /// `true` (or its sender is dropped).
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::Transport` if receiving or acknowledging fails.
    pub async fn run<R>(
        &self,
        mut receiver: R,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConsumerError>
    where
        R: CommandReceiver,
    {
        info!(registry_id = %self.registry_id, "command consumer started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let received = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                received = receiver.receive() => received?,
            };
            let Some(delivery) = received else {
                info!("command transport closed");
                break;
            };
            self.process(&mut receiver, delivery).await?;
        }
        info!(registry_id = %self.registry_id, "command consumer stopped");
        Ok(())
    }

    /// Handles one delivery and acknowledges or negatively acknowledges it.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::Transport` if the ack or nack fails. Handling
    /// and routing failures are reported as `DeliveryOutcome::Retried`.
    #[instrument(
        skip(self, receiver, delivery),
        fields(delivery_id = delivery.delivery_id, redelivery_count = delivery.redelivery_count)
    )]
    pub async fn process(
        &self,
        receiver: &mut (impl CommandReceiver + ?Sized),
        delivery: CommandDelivery,
    ) -> Result<DeliveryOutcome, ConsumerError> {
        let Some(correlation_id) = delivery
            .correlation_property()
            .and_then(|raw| raw.parse::<CorrelationId>().ok())
        else {
            error!("command has no valid correlation id; discarding");
            receiver.acknowledge(delivery.delivery_id).await?;
            return Ok(DeliveryOutcome::Poisoned);
        };

        let command = match ProductRegistryCommand::decode(&delivery.payload) {
            Ok(command) => command,
            Err(err) => {
                error!(
                    correlation_id = %correlation_id,
                    error = %err,
                    "undecodable command; discarding"
                );
                receiver.acknowledge(delivery.delivery_id).await?;
                return Ok(DeliveryOutcome::Poisoned);
            }
        };

        match self
            .dispatch(&command, correlation_id, delivery.redelivery_count)
            .await
        {
            Ok(outcome) => {
                receiver.acknowledge(delivery.delivery_id).await?;
                Ok(outcome)
            }
            Err(err) => {
                let reason = err.to_string();
                warn!(
                    correlation_id = %correlation_id,
                    error = %reason,
                    "command failed; requesting redelivery"
                );
                receiver
                    .negative_acknowledge(delivery.delivery_id, &reason)
                    .await?;
                Ok(DeliveryOutcome::Retried(reason))
            }
        }
    }

    async fn dispatch(
        &self,
        command: &ProductRegistryCommand,
        correlation_id: CorrelationId,
        redelivery_count: u32,
    ) -> Result<DeliveryOutcome, ConsumerError> {
        if redelivery_count > 0 {
            let recorded = self
                .handler
                .load_recorded_events(self.registry_id, correlation_id)
                .await?;
            if !recorded.is_empty() {
                for event in &recorded {
                    self.router.route_event(correlation_id, event).await?;
                }
                info!(
                    correlation_id = %correlation_id,
                    count = recorded.len(),
                    "re-routed recorded events"
                );
                return Ok(DeliveryOutcome::Replayed);
            }
        }

        match self
            .handler
            .handle(self.registry_id, command, correlation_id)
            .await?
        {
            CommandOutcome::Applied(event) => {
                if let Err(err) = self.router.route_event(correlation_id, &event).await {
                    self.handler.invalidate(self.registry_id).await;
                    return Err(err.into());
                }
                Ok(DeliveryOutcome::Applied)
            }
            CommandOutcome::Rejected(rejection) => {
                self.router.route_error(correlation_id, &rejection).await?;
                Ok(DeliveryOutcome::Rejected)
            }
        }
    }
}
