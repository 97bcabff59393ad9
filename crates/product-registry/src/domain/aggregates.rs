//! The registry aggregate root.

use std::collections::BTreeMap;

use registry_core::aggregate::AggregateRoot;
use registry_core::clock::Clock;
use registry_core::correlation::CorrelationId;
use registry_core::event::EventMetadata;
use uuid::Uuid;

use super::commands::ProductRegistryCommand;
use super::errors::RegistryRejection;
use super::events::{
    PRODUCT_REGISTERED_EVENT_TYPE, PRODUCT_REMOVED_EVENT_TYPE, PRODUCT_UPDATED_EVENT_TYPE,
    ProductRegistered, ProductRegistryEvent, ProductRegistryEventKind, ProductRemoved,
    ProductUpdated,
};
use super::product::{Product, ProductId};

/// The aggregate root holding every live product of one registry.
///
/// Product ids are unique by construction of the map. Name uniqueness is
/// checked in `handle`; `apply` trusts events that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRegistry {
    id: Uuid,
    version: i64,
    products: BTreeMap<ProductId, Product>,
}

impl ProductRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            products: BTreeMap::new(),
        }
    }

    /// True when no live product uses `name`.
    #[must_use]
    pub fn is_name_available(&self, name: &str) -> bool {
        !self.products.values().any(|p| p.name == name)
    }

    /// True when a product with `id` is registered.
    #[must_use]
    pub fn has_product_with_id(&self, id: &ProductId) -> bool {
        self.products.contains_key(id)
    }

    /// True when a product equal to `product` in every field is registered.
    #[must_use]
    pub fn has_product(&self, product: &Product) -> bool {
        self.products.get(&product.id) == Some(product)
    }

    /// Looks up a product by id.
    #[must_use]
    pub fn product(&self, id: &ProductId) -> Option<&Product> {
        self.products.get(id)
    }

    /// Live products, ordered by id.
    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    fn name_taken_by_other(&self, id: &ProductId, name: &str) -> bool {
        self.products
            .values()
            .any(|p| p.name == name && &p.id != id)
    }

    fn validate(&self, command: &ProductRegistryCommand) -> Result<(), RegistryRejection> {
        match command {
            ProductRegistryCommand::RegisterProduct(c) => {
                if self.has_product_with_id(&c.product_id) {
                    return Err(RegistryRejection::DuplicateProductId(c.product_id.clone()));
                }
                if !self.is_name_available(&c.name) {
                    return Err(RegistryRejection::ProductNameTaken(c.name.clone()));
                }
            }
            ProductRegistryCommand::UpdateProduct(c) => {
                if !self.has_product_with_id(&c.product_id) {
                    return Err(RegistryRejection::ProductNotFound(c.product_id.clone()));
                }
                if self.name_taken_by_other(&c.product_id, &c.name) {
                    return Err(RegistryRejection::ProductNameTaken(c.name.clone()));
                }
            }
            ProductRegistryCommand::RemoveProduct(c) => {
                if !self.has_product_with_id(&c.product_id) {
                    return Err(RegistryRejection::ProductNotFound(c.product_id.clone()));
                }
            }
        }
        Ok(())
    }
}

impl AggregateRoot for ProductRegistry {
    type Command = ProductRegistryCommand;
    type Event = ProductRegistryEvent;
    type Rejection = RegistryRejection;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn handle(
        &self,
        command: &Self::Command,
        correlation_id: CorrelationId,
        clock: &dyn Clock,
    ) -> Result<Self::Event, Self::Rejection> {
        self.validate(command)?;

        let (event_type, kind) = match command {
            ProductRegistryCommand::RegisterProduct(c) => (
                PRODUCT_REGISTERED_EVENT_TYPE,
                ProductRegistryEventKind::ProductRegistered(ProductRegistered {
                    product_id: c.product_id.clone(),
                    name: c.name.clone(),
                    description: c.description.clone(),
                }),
            ),
            ProductRegistryCommand::UpdateProduct(c) => (
                PRODUCT_UPDATED_EVENT_TYPE,
                ProductRegistryEventKind::ProductUpdated(ProductUpdated {
                    product_id: c.product_id.clone(),
                    name: c.name.clone(),
                    description: c.description.clone(),
                }),
            ),
            ProductRegistryCommand::RemoveProduct(c) => (
                PRODUCT_REMOVED_EVENT_TYPE,
                ProductRegistryEventKind::ProductRemoved(ProductRemoved {
                    product_id: c.product_id.clone(),
                }),
            ),
        };

        Ok(ProductRegistryEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: event_type.to_owned(),
                aggregate_root_id: self.id,
                version: self.version + 1,
                correlation_id,
                causation_id: correlation_id.as_uuid(),
                occurred_at: clock.now(),
            },
            kind,
        })
    }

    fn apply(&mut self, event: &Self::Event) {
        match &event.kind {
            ProductRegistryEventKind::ProductRegistered(p) => {
                self.products.insert(
                    p.product_id.clone(),
                    Product {
                        id: p.product_id.clone(),
                        name: p.name.clone(),
                        description: p.description.clone(),
                    },
                );
            }
            ProductRegistryEventKind::ProductUpdated(p) => {
                self.products.insert(
                    p.product_id.clone(),
                    Product {
                        id: p.product_id.clone(),
                        name: p.name.clone(),
                        description: p.description.clone(),
                    },
                );
            }
            ProductRegistryEventKind::ProductRemoved(p) => {
                self.products.remove(&p.product_id);
            }
        }
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use registry_core::event::DomainEvent;
    use registry_test_support::FixedClock;

    use super::*;
    use crate::domain::commands::{RegisterProduct, RemoveProduct, UpdateProduct};

    fn pid(raw: &str) -> ProductId {
        raw.parse().unwrap()
    }

    fn register(id: &str, name: &str) -> ProductRegistryCommand {
        ProductRegistryCommand::RegisterProduct(RegisterProduct {
            product_id: pid(id),
            name: name.to_owned(),
            description: format!("{name} description"),
        })
    }

    fn update(id: &str, name: &str) -> ProductRegistryCommand {
        ProductRegistryCommand::UpdateProduct(UpdateProduct {
            product_id: pid(id),
            name: name.to_owned(),
            description: "updated".to_owned(),
        })
    }

    fn remove(id: &str) -> ProductRegistryCommand {
        ProductRegistryCommand::RemoveProduct(RemoveProduct {
            product_id: pid(id),
        })
    }

    /// Handles and applies each command, returning the produced events.
    fn run(
        registry: &mut ProductRegistry,
        commands: &[ProductRegistryCommand],
    ) -> Vec<ProductRegistryEvent> {
        let clock = FixedClock::default();
        commands
            .iter()
            .map(|command| {
                let event = registry
                    .handle(command, CorrelationId::new(), &clock)
                    .unwrap();
                registry.apply(&event);
                event
            })
            .collect()
    }

    #[test]
    fn test_register_product_produces_product_registered_event() {
        // Arrange
        let registry_id = Uuid::new_v4();
        let correlation_id = CorrelationId::new();
        let fixed_now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let clock = FixedClock(fixed_now);
        let registry = ProductRegistry::new(registry_id);
        let command = ProductRegistryCommand::RegisterProduct(RegisterProduct {
            product_id: pid("12345"),
            name: "Test Product".to_owned(),
            description: "A product for testing.".to_owned(),
        });

        // Act
        let event = registry.handle(&command, correlation_id, &clock).unwrap();

        // Assert
        assert_eq!(event.event_type(), PRODUCT_REGISTERED_EVENT_TYPE);
        let meta = event.metadata();
        assert_eq!(meta.aggregate_root_id, registry_id);
        assert_eq!(meta.version, 1);
        assert_eq!(meta.correlation_id, correlation_id);
        assert_eq!(meta.causation_id, correlation_id.as_uuid());
        assert_eq!(meta.occurred_at, fixed_now);
        match &event.kind {
            ProductRegistryEventKind::ProductRegistered(payload) => {
                assert_eq!(payload.product_id, pid("12345"));
                assert_eq!(payload.name, "Test Product");
                assert_eq!(payload.description, "A product for testing.");
            }
            other => panic!("expected ProductRegistered, got {other:?}"),
        }
    }

    #[test]
    fn test_handle_leaves_state_untouched() {
        let registry = ProductRegistry::new(Uuid::new_v4());
        let before = registry.clone();

        registry
            .handle(
                &register("12345", "Test Product"),
                CorrelationId::new(),
                &FixedClock::default(),
            )
            .unwrap();

        assert_eq!(registry, before);
        assert_eq!(registry.version(), 0);
    }

    #[test]
    fn test_apply_registered_adds_product() {
        let mut registry = ProductRegistry::new(Uuid::new_v4());

        run(&mut registry, &[register("12345", "Test Product")]);

        assert!(registry.has_product_with_id(&pid("12345")));
        assert!(!registry.is_name_available("Test Product"));
        assert_eq!(registry.version(), 1);
    }

    #[test]
    fn test_register_duplicate_id_is_rejected_without_change() {
        // Arrange
        let mut registry = ProductRegistry::new(Uuid::new_v4());
        run(&mut registry, &[register("12345", "Test Product")]);
        let before = registry.clone();

        // Act
        let result = registry.handle(
            &register("12345", "Another Name"),
            CorrelationId::new(),
            &FixedClock::default(),
        );

        // Assert
        assert_eq!(
            result.unwrap_err(),
            RegistryRejection::DuplicateProductId(pid("12345"))
        );
        assert_eq!(registry, before);
    }

    #[test]
    fn test_register_taken_name_is_rejected() {
        let mut registry = ProductRegistry::new(Uuid::new_v4());
        run(&mut registry, &[register("1", "Product Name")]);

        let result = registry.handle(
            &register("2", "Product Name"),
            CorrelationId::new(),
            &FixedClock::default(),
        );

        assert_eq!(
            result.unwrap_err(),
            RegistryRejection::ProductNameTaken("Product Name".to_owned())
        );
        assert_eq!(registry.version(), 1);
    }

    #[test]
    fn test_name_is_available_again_after_removal() {
        let mut registry = ProductRegistry::new(Uuid::new_v4());
        run(&mut registry, &[register("1", "Product Name"), remove("1")]);

        assert!(registry.is_name_available("Product Name"));
        run(&mut registry, &[register("2", "Product Name")]);
        assert_eq!(registry.version(), 3);
    }

    #[test]
    fn test_update_or_remove_unknown_id_is_rejected() {
        let registry = ProductRegistry::new(Uuid::new_v4());
        let clock = FixedClock::default();

        let updated = registry.handle(&update("404", "Name"), CorrelationId::new(), &clock);
        let removed = registry.handle(&remove("404"), CorrelationId::new(), &clock);

        assert_eq!(
            updated.unwrap_err(),
            RegistryRejection::ProductNotFound(pid("404"))
        );
        assert_eq!(
            removed.unwrap_err(),
            RegistryRejection::ProductNotFound(pid("404"))
        );
        assert_eq!(registry.version(), 0);
    }

    #[test]
    fn test_update_may_keep_its_own_name() {
        let mut registry = ProductRegistry::new(Uuid::new_v4());
        run(&mut registry, &[register("1", "Product Name")]);

        run(&mut registry, &[update("1", "Product Name")]);

        let product = registry.product(&pid("1")).unwrap();
        assert_eq!(product.description, "updated");
        assert_eq!(registry.version(), 2);
    }

    #[test]
    fn test_update_to_another_products_name_is_rejected() {
        let mut registry = ProductRegistry::new(Uuid::new_v4());
        run(&mut registry, &[register("1", "First"), register("2", "Second")]);

        let result = registry.handle(
            &update("2", "First"),
            CorrelationId::new(),
            &FixedClock::default(),
        );

        assert_eq!(
            result.unwrap_err(),
            RegistryRejection::ProductNameTaken("First".to_owned())
        );
    }

    #[test]
    fn test_register_then_remove_toggles_has_product_with_id() {
        let mut registry = ProductRegistry::new(Uuid::new_v4());

        run(&mut registry, &[register("12345", "Test Product")]);
        assert!(registry.has_product_with_id(&pid("12345")));

        run(&mut registry, &[remove("12345")]);
        assert!(!registry.has_product_with_id(&pid("12345")));
        assert_eq!(registry.version(), 2);
    }

    #[test]
    fn test_has_product_requires_every_field_to_match() {
        let mut registry = ProductRegistry::new(Uuid::new_v4());
        run(&mut registry, &[register("1", "Product Name")]);
        let stored = registry.product(&pid("1")).unwrap().clone();

        let mut renamed = stored.clone();
        renamed.name = "Other".to_owned();

        assert!(registry.has_product(&stored));
        assert!(!registry.has_product(&renamed));
    }

    #[test]
    fn test_replay_is_deterministic() {
        // Arrange
        let registry_id = Uuid::new_v4();
        let mut original = ProductRegistry::new(registry_id);
        let events = run(
            &mut original,
            &[
                register("1", "First"),
                register("2", "Second"),
                update("1", "Renamed"),
                remove("2"),
            ],
        );

        // Act
        let replays: Vec<ProductRegistry> = (0..3)
            .map(|_| {
                let mut replayed = ProductRegistry::new(registry_id);
                for event in &events {
                    replayed.apply(event);
                }
                replayed
            })
            .collect();

        // Assert
        for replayed in &replays {
            assert_eq!(replayed, &original);
            assert_eq!(replayed.version(), 4);
        }
        let names: Vec<&str> = original.products().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Renamed"]);
    }

    #[test]
    fn test_event_versions_are_sequential() {
        let mut registry = ProductRegistry::new(Uuid::new_v4());

        let events = run(
            &mut registry,
            &[register("1", "A"), register("2", "B"), remove("1")],
        );

        let versions: Vec<i64> = events.iter().map(|e| e.metadata.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }
}
