//! # dastarkhan-storage
//!
//! Source store abstraction layer for Dastarkhan.
//!
//! The relational store is the source of truth behind the cache tiers. This
//! crate defines the contract every backend implements and two decorators
//! that the cache layer composes around a backend:
//!
//! - [`ObservedStore`]: reports successful writes to a [`MutationObserver`]
//!   (the cache invalidator), and reports transaction writes on commit.
//! - [`RetryingStore`]: retries a transient failure exactly once after
//!   rebuilding the store connection.
//!
//! ## Example
//!
//! ```ignore
//! use dastarkhan_storage::{ObservedStore, RetryingStore};
//!
//! let store = ObservedStore::new(RetryingStore::new(postgres), invalidator);
//! store.update(Collection::MenuItem, "osh", &json!({"name": "Osh Plov"})).await?;
//! ```

mod error;
pub mod observed;
pub mod retry;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use observed::{MutationObserver, ObservedStore, ObservedTransaction};
pub use retry::{DEFAULT_RETRY_BACKOFF, RetryingStore};
pub use traits::{Reconnect, SourceStore, Transaction, merge_patch, payload_id, prepare_payload};
pub use types::{
    Collection, Filter, FindMany, Mutation, MutationKind, SortParam, StoredRecord,
};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared source store trait object.
pub type DynStore = std::sync::Arc<dyn SourceStore>;
