//! Business-rule rejections and their wire shape.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::product::ProductId;

/// Reasons the registry refuses a command. A rejection produces no event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryRejection {
    /// Registering an id that is already present.
    #[error("product {0} is already registered")]
    DuplicateProductId(ProductId),

    /// The name belongs to another live product.
    #[error("product name '{0}' is already in use")]
    ProductNameTaken(String),

    /// Updating or removing an id that is not present.
    #[error("product {0} does not exist")]
    ProductNotFound(ProductId),
}

impl RegistryRejection {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateProductId(_) => "duplicate_product_id",
            Self::ProductNameTaken(_) => "product_name_taken",
            Self::ProductNotFound(_) => "product_not_found",
        }
    }
}

/// Error message delivered on a correlation channel.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct RegistryError {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl From<&RegistryRejection> for RegistryError {
    fn from(rejection: &RegistryRejection) -> Self {
        Self {
            code: rejection.code().to_owned(),
            message: rejection.to_string(),
        }
    }
}

impl From<RegistryRejection> for RegistryError {
    fn from(rejection: RegistryRejection) -> Self {
        Self::from(&rejection)
    }
}
