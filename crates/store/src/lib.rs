//! Storage implementations for Prepwise.
//!
//! Every backend implements the three persistence contracts from
//! `prepwise_core::store` and `prepwise_core::log`: settings by key, the
//! append-only generation log, and guarded counters.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
