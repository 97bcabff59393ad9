//! Registry Core — shared domain and transport abstractions.
//!
//! This crate defines the fundamental traits and types that the product
//! registry bounded context and its adapters depend on. It contains no
//! infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod correlation;
pub mod error;
pub mod event;
pub mod repository;
pub mod transport;
