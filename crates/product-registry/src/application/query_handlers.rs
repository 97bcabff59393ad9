//! Query handlers for the product registry.
//!
//! Reconstitute the registry from stored events and return read-only views.

use registry_core::aggregate::AggregateRoot;
use registry_core::error::DomainError;
use registry_core::repository::EventRepository;
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers;
use crate::domain::product::{Product, ProductId};

/// Read-only view of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductView {
    /// The product identifier.
    pub product_id: ProductId,
    /// The product name.
    pub name: String,
    /// The product description.
    pub description: String,
}

impl From<&Product> for ProductView {
    fn from(product: &Product) -> Self {
        Self {
            product_id: product.id.clone(),
            name: product.name.clone(),
            description: product.description.clone(),
        }
    }
}

/// Read-only view of the whole registry.
#[derive(Debug, Serialize)]
pub struct RegistryView {
    /// The registry identifier.
    pub registry_id: Uuid,
    /// Current version (event count).
    pub version: i64,
    /// Live products, sorted by id.
    pub products: Vec<ProductView>,
}

/// Retrieves the registry `registry_id`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist for the ID.
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub async fn get_registry(
    registry_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<RegistryView, DomainError> {
    let stored_events = repo.load_events(registry_id).await?;
    if stored_events.is_empty() {
        return Err(DomainError::AggregateNotFound(registry_id));
    }
    let registry = command_handlers::reconstitute(registry_id, &stored_events)?;
    Ok(RegistryView {
        registry_id,
        version: registry.version(),
        products: registry.products().map(ProductView::from).collect(),
    })
}

/// Retrieves one product of the registry, or `None` if it is not live.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if loading or deserialization fails.
pub async fn get_product(
    registry_id: Uuid,
    product_id: &ProductId,
    repo: &dyn EventRepository,
) -> Result<Option<ProductView>, DomainError> {
    let stored_events = repo.load_events(registry_id).await?;
    let registry = command_handlers::reconstitute(registry_id, &stored_events)?;
    Ok(registry.product(product_id).map(ProductView::from))
}
