//! Application layer: command handling, query handling and result delivery.

pub mod command_consumer;
pub mod command_handlers;
pub mod correlation_bridge;
pub mod emitter;
pub mod event_router;
pub mod query_handlers;
