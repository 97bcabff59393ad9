//! PostgreSQL-backed event store for the product registry.
//!
//! The table layout lives in `migrations/` at the workspace root and is
//! applied with `sqlx::migrate!` at startup.

pub mod pg_event_repository;
