//! In-process transport for the product registry.
//!
//! Implements the command transport (single consumer, ack/nack with bounded
//! redelivery) and the per-correlation event transport (one exclusive
//! subscription per scope) on tokio channels. Suitable for a single-node
//! deployment; there is no clustering.

mod broker;
mod channels;
mod commands;

pub use broker::{BrokerConfig, InMemoryBroker};
pub use channels::{InMemoryProducer, InMemorySubscription};
pub use commands::InMemoryCommandReceiver;
