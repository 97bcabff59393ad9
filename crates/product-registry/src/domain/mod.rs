//! Domain layer: the registry aggregate and its commands, events and messages.

pub mod aggregates;
pub mod commands;
pub mod errors;
pub mod events;
pub mod messages;
pub mod product;
