//! Product registry bounded context.
//!
//! Owns the event-sourced registry aggregate and everything that moves a
//! command's outcome back to the caller who dispatched it: the command
//! consumer, the per-correlation event router and the correlation bridge.

pub mod application;
pub mod domain;
