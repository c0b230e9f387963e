//! Append-only event store boundary.
//!
//! Shop-scoped streams behind the [`EventStore`] trait, with an in-memory
//! backend for tests and a Postgres backend (feature `postgres`) for
//! persistent deployments.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
