//! Domain events for the product registry.

use registry_core::error::DomainError;
use registry_core::event::{DomainEvent, EventMetadata};
use registry_core::repository::StoredEvent;
use serde::{Deserialize, Serialize};

use super::product::ProductId;

/// Event type discriminator for `ProductRegistered`.
pub const PRODUCT_REGISTERED_EVENT_TYPE: &str = "ProductRegistered";
/// Event type discriminator for `ProductUpdated`.
pub const PRODUCT_UPDATED_EVENT_TYPE: &str = "ProductUpdated";
/// Event type discriminator for `ProductRemoved`.
pub const PRODUCT_REMOVED_EVENT_TYPE: &str = "ProductRemoved";

/// Emitted when a product is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRegistered {
    /// The product identifier.
    pub product_id: ProductId,
    /// The product name.
    pub name: String,
    /// The product description.
    pub description: String,
}

/// Emitted when a product's name and description are replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    /// The product identifier.
    pub product_id: ProductId,
    /// The new name.
    pub name: String,
    /// The new description.
    pub description: String,
}

/// Emitted when a product is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRemoved {
    /// The product identifier.
    pub product_id: ProductId,
}

/// Event payload variants for the product registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductRegistryEventKind {
    /// A product has been registered.
    ProductRegistered(ProductRegistered),
    /// A product has been updated.
    ProductUpdated(ProductUpdated),
    /// A product has been removed.
    ProductRemoved(ProductRemoved),
}

impl ProductRegistryEventKind {
    /// The product the event concerns.
    #[must_use]
    pub fn product_id(&self) -> &ProductId {
        match self {
            Self::ProductRegistered(p) => &p.product_id,
            Self::ProductUpdated(p) => &p.product_id,
            Self::ProductRemoved(p) => &p.product_id,
        }
    }
}

/// Domain event envelope for the product registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRegistryEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: ProductRegistryEventKind,
}

impl ProductRegistryEvent {
    /// Rebuilds an event from its stored form, dispatching on `event_type`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` for an unknown discriminator or a
    /// payload that does not match it.
    pub fn from_stored(stored: &StoredEvent) -> Result<Self, DomainError> {
        let payload = stored.payload.clone();
        let kind = match stored.event_type.as_str() {
            PRODUCT_REGISTERED_EVENT_TYPE => {
                serde_json::from_value(payload).map(ProductRegistryEventKind::ProductRegistered)
            }
            PRODUCT_UPDATED_EVENT_TYPE => {
                serde_json::from_value(payload).map(ProductRegistryEventKind::ProductUpdated)
            }
            PRODUCT_REMOVED_EVENT_TYPE => {
                serde_json::from_value(payload).map(ProductRegistryEventKind::ProductRemoved)
            }
            other => {
                return Err(DomainError::Infrastructure(format!(
                    "unknown event type {other} at version {}",
                    stored.version
                )));
            }
        }
        .map_err(|e| {
            DomainError::Infrastructure(format!("event deserialization failed: {e}"))
        })?;

        Ok(Self {
            metadata: EventMetadata {
                event_id: stored.event_id,
                event_type: stored.event_type.clone(),
                aggregate_root_id: stored.aggregate_root_id,
                version: stored.version,
                correlation_id: stored.correlation_id,
                causation_id: stored.causation_id,
                occurred_at: stored.occurred_at,
            },
            kind,
        })
    }

    /// Converts the event to its stored form.
    #[must_use]
    pub fn to_stored(&self) -> StoredEvent {
        let meta = self.metadata();
        StoredEvent {
            event_id: meta.event_id,
            aggregate_root_id: meta.aggregate_root_id,
            event_type: self.event_type().to_owned(),
            payload: self.to_payload(),
            version: meta.version,
            correlation_id: meta.correlation_id,
            causation_id: meta.causation_id,
            occurred_at: meta.occurred_at,
        }
    }
}

impl DomainEvent for ProductRegistryEvent {
    fn event_type(&self) -> &'static str {
        match &self.kind {
            ProductRegistryEventKind::ProductRegistered(_) => PRODUCT_REGISTERED_EVENT_TYPE,
            ProductRegistryEventKind::ProductUpdated(_) => PRODUCT_UPDATED_EVENT_TYPE,
            ProductRegistryEventKind::ProductRemoved(_) => PRODUCT_REMOVED_EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> serde_json::Value {
        match &self.kind {
            ProductRegistryEventKind::ProductRegistered(p) => serde_json::json!(p),
            ProductRegistryEventKind::ProductUpdated(p) => serde_json::json!(p),
            ProductRegistryEventKind::ProductRemoved(p) => serde_json::json!(p),
        }
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use registry_core::correlation::CorrelationId;
    use uuid::Uuid;

    use super::*;

    fn stored(event_type: &str, payload: serde_json::Value) -> StoredEvent {
        let correlation_id = CorrelationId::new();
        StoredEvent {
            event_id: Uuid::new_v4(),
            aggregate_root_id: Uuid::new_v4(),
            event_type: event_type.to_owned(),
            payload,
            version: 1,
            correlation_id,
            causation_id: correlation_id.as_uuid(),
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_from_stored_dispatches_on_event_type() {
        // Arrange
        let stored = stored(
            PRODUCT_REMOVED_EVENT_TYPE,
            serde_json::json!({"product_id": "12345"}),
        );

        // Act
        let event = ProductRegistryEvent::from_stored(&stored).unwrap();

        // Assert
        assert_eq!(event.event_type(), PRODUCT_REMOVED_EVENT_TYPE);
        assert_eq!(event.kind.product_id().as_str(), "12345");
        assert_eq!(event.metadata.version, 1);
        assert_eq!(event.to_stored(), stored);
    }

    #[test]
    fn test_stored_payload_is_the_variant_alone() {
        let stored = stored(
            PRODUCT_REGISTERED_EVENT_TYPE,
            serde_json::json!({
                "product_id": "12345",
                "name": "Test Product",
                "description": "A product for testing."
            }),
        );

        let event = ProductRegistryEvent::from_stored(&stored).unwrap();

        assert_eq!(event.to_payload(), stored.payload);
    }

    #[test]
    fn test_from_stored_rejects_unknown_event_type() {
        let stored = stored("ProductArchived", serde_json::json!({}));

        match ProductRegistryEvent::from_stored(&stored).unwrap_err() {
            DomainError::Infrastructure(msg) => assert!(msg.contains("ProductArchived")),
            other => panic!("expected Infrastructure, got {other:?}"),
        }
    }

    #[test]
    fn test_from_stored_rejects_mismatched_payload() {
        let stored = stored(
            PRODUCT_UPDATED_EVENT_TYPE,
            serde_json::json!({"product_id": "12345"}),
        );

        assert!(matches!(
            ProductRegistryEvent::from_stored(&stored),
            Err(DomainError::Infrastructure(_))
        ));
    }
}
