//! Messages carried on per-correlation result channels.

use serde::{Deserialize, Serialize};

use super::errors::RegistryError;
use super::events::ProductRegistryEvent;

/// What a result channel carries: the event a command produced, or the error
/// it was rejected with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelMessage {
    /// The command was applied and produced this event.
    ProductRegistryEvent(ProductRegistryEvent),
    /// The command was rejected.
    ProductRegistryError(RegistryError),
}

impl ChannelMessage {
    /// Encodes the message for the event transport.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes a message received from the event transport.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the bytes are not a channel message.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
