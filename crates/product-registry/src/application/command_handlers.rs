//! Command handling for the product registry.
//!
//! Loads (or catches up) the registry, lets it decide, persists the resulting
//! event with an expected-version guard, then applies it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use registry_core::aggregate::AggregateRoot;
use registry_core::clock::Clock;
use registry_core::command::Command;
use registry_core::correlation::CorrelationId;
use registry_core::error::DomainError;
use registry_core::repository::{EventRepository, StoredEvent};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::aggregates::ProductRegistry;
use crate::domain::commands::ProductRegistryCommand;
use crate::domain::errors::RegistryError;
use crate::domain::events::ProductRegistryEvent;

/// Business outcome of a handled command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command was accepted; this event was persisted and applied.
    Applied(ProductRegistryEvent),
    /// The command broke a business rule; nothing was persisted.
    Rejected(RegistryError),
}

/// Applies stored events on top of `registry`, which must be exactly one
/// version behind the first of them.
fn catch_up(registry: &mut ProductRegistry, stored: &[StoredEvent]) -> Result<(), DomainError> {
    for stored_event in stored {
        if stored_event.version != registry.version() + 1 {
            return Err(DomainError::Infrastructure(format!(
                "event stream of {} jumps from version {} to {}",
                registry.aggregate_id(),
                registry.version(),
                stored_event.version
            )));
        }
        let event = ProductRegistryEvent::from_stored(stored_event)?;
        registry.apply(&event);
    }
    Ok(())
}

/// Reconstitutes a `ProductRegistry` from its full event history.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if an event cannot be decoded or the
/// history has a version gap.
pub fn reconstitute(
    registry_id: Uuid,
    existing_events: &[StoredEvent],
) -> Result<ProductRegistry, DomainError> {
    let mut registry = ProductRegistry::new(registry_id);
    catch_up(&mut registry, existing_events)?;
    Ok(registry)
}

type CacheSlot = Arc<tokio::sync::Mutex<Option<ProductRegistry>>>;

/// Handles registry commands against an explicit per-root cache.
///
/// Each root's entry sits behind its own async mutex, so commands on one root
/// are handled one at a time. The entry is caught up from the store before
/// every command and dropped whenever persisting fails.
pub struct RegistryCommandHandler {
    repo: Arc<dyn EventRepository>,
    clock: Arc<dyn Clock>,
    cache: Mutex<HashMap<Uuid, CacheSlot>>,
}

impl RegistryCommandHandler {
    /// Creates a handler with an empty cache.
    #[must_use]
    pub fn new(repo: Arc<dyn EventRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            clock,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, registry_id: Uuid) -> CacheSlot {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cache.entry(registry_id).or_default())
    }

    /// Drops the cached registry so the next command rehydrates it.
    pub async fn invalidate(&self, registry_id: Uuid) {
        let slot = self.slot(registry_id);
        slot.lock().await.take();
        debug!(registry_id = %registry_id, "invalidated cached registry");
    }

    /// Handles one command against the registry `registry_id`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if loading, decoding or appending events fails,
    /// including `DomainError::ConcurrencyConflict` when another writer got
    /// there first. Business-rule violations are `Ok(CommandOutcome::Rejected)`.
    pub async fn handle(
        &self,
        registry_id: Uuid,
        command: &ProductRegistryCommand,
        correlation_id: CorrelationId,
    ) -> Result<CommandOutcome, DomainError> {
        let slot = self.slot(registry_id);
        let mut cached = slot.lock().await;

        // Taken out so that any early return leaves the entry invalidated.
        let mut registry = cached
            .take()
            .unwrap_or_else(|| ProductRegistry::new(registry_id));
        let newer = self
            .repo
            .load_events_since(registry_id, registry.version())
            .await?;
        catch_up(&mut registry, &newer)?;

        let event = match registry.handle(command, correlation_id, self.clock.as_ref()) {
            Ok(event) => event,
            Err(rejection) => {
                info!(
                    registry_id = %registry_id,
                    correlation_id = %correlation_id,
                    command_type = command.command_type(),
                    code = rejection.code(),
                    "command rejected"
                );
                *cached = Some(registry);
                return Ok(CommandOutcome::Rejected(RegistryError::from(&rejection)));
            }
        };

        if let Err(err) = self
            .repo
            .append_events(registry_id, registry.version(), &[event.to_stored()])
            .await
        {
            warn!(
                registry_id = %registry_id,
                correlation_id = %correlation_id,
                error = %err,
                "failed to persist event"
            );
            return Err(err);
        }
        registry.apply(&event);

        info!(
            registry_id = %registry_id,
            correlation_id = %correlation_id,
            command_type = command.command_type(),
            version = registry.version(),
            "command applied"
        );
        *cached = Some(registry);
        Ok(CommandOutcome::Applied(event))
    }

    /// Events already recorded for the command carrying `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if loading or decoding fails.
    pub async fn load_recorded_events(
        &self,
        registry_id: Uuid,
        correlation_id: CorrelationId,
    ) -> Result<Vec<ProductRegistryEvent>, DomainError> {
        self.repo
            .load_events_by_correlation_id(registry_id, correlation_id)
            .await?
            .iter()
            .map(ProductRegistryEvent::from_stored)
            .collect()
    }
}
