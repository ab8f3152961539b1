//! In-memory source store backend for Dastarkhan.
//!
//! This crate provides an in-memory implementation of the `SourceStore`
//! trait from `dastarkhan-storage`, using a papaya lock-free HashMap for
//! concurrent access. It is the store behind the cache test-suite and the
//! fallback when the server runs without a database URL.
//!
//! # Example
//!
//! ```ignore
//! use dastarkhan_db_memory::InMemoryStore;
//! use dastarkhan_storage::{Collection, SourceStore};
//!
//! let store = InMemoryStore::new();
//! store.create(Collection::MenuItem, &json!({"id": "osh", "name": "Osh"})).await?;
//! assert_eq!(store.read_count(), 0);
//! ```

pub mod storage;

pub use dastarkhan_storage::{SourceStore, StorageError, StoredRecord};
pub use storage::{InMemoryStore, InMemoryTransaction, StorageKey};

/// Creates a new shared in-memory store.
pub fn create_memory_store() -> std::sync::Arc<InMemoryStore> {
    std::sync::Arc::new(InMemoryStore::new())
}
