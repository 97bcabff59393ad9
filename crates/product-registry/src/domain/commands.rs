//! Commands for the product registry.

use registry_core::command::Command;
use serde::{Deserialize, Serialize};

use super::product::ProductId;

/// Command to register a new product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProduct {
    /// The product identifier.
    pub product_id: ProductId,
    /// The product name.
    pub name: String,
    /// The product description.
    pub description: String,
}

/// Command to replace a product's name and description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    /// The product identifier.
    pub product_id: ProductId,
    /// The new name.
    pub name: String,
    /// The new description.
    pub description: String,
}

/// Command to remove a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveProduct {
    /// The product identifier.
    pub product_id: ProductId,
}

/// Every command the registry accepts, as carried on the command transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProductRegistryCommand {
    /// See [`RegisterProduct`].
    RegisterProduct(RegisterProduct),
    /// See [`UpdateProduct`].
    UpdateProduct(UpdateProduct),
    /// See [`RemoveProduct`].
    RemoveProduct(RemoveProduct),
}

impl ProductRegistryCommand {
    /// The product the command targets.
    #[must_use]
    pub fn product_id(&self) -> &ProductId {
        match self {
            Self::RegisterProduct(c) => &c.product_id,
            Self::UpdateProduct(c) => &c.product_id,
            Self::RemoveProduct(c) => &c.product_id,
        }
    }

    /// Encodes the command for the command transport.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes a command received from the command transport.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the bytes are not a known command.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl Command for ProductRegistryCommand {
    fn command_type(&self) -> &'static str {
        match self {
            Self::RegisterProduct(_) => "RegisterProduct",
            Self::UpdateProduct(_) => "UpdateProduct",
            Self::RemoveProduct(_) => "RemoveProduct",
        }
    }
}
