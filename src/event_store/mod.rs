//! Event Store module
//!
//! Append-only log of domain events in PostgreSQL.

mod error;
mod repository;

pub use error::EventStoreError;
pub use repository::{EventFilter, EventStore, StoredEvent};
