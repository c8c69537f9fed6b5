//! # Symphony Infrastructure
//!
//! Concrete implementations of the storage ports: an in-memory envelope
//! store and ledger for embedded deployments and tests, and PostgreSQL
//! implementations backed by `sqlx` for production.

pub mod memory_store;
pub mod postgres;

pub use memory_store::{InMemoryEnvelopeStore, InMemoryFailedLedger};
pub use postgres::{PostgresEnvelopeStore, PostgresFailedLedger};
