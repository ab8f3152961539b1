//! Storage traits for the source store abstraction layer.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::types::{Collection, FindMany, StoredRecord};

/// The relational source of truth behind every cache tier.
///
/// Implementations must be thread-safe (`Send + Sync`). The cache layer
/// only ever reads through this trait; writes go through it as well so
/// that a wrapping [`ObservedStore`](crate::ObservedStore) can see them.
///
/// # Example
///
/// ```ignore
/// use dastarkhan_storage::{Collection, FindMany, SortParam, SourceStore};
///
/// async fn menu_names(store: &dyn SourceStore) -> Result<Vec<String>, StorageError> {
///     let query = FindMany::new().order_by(SortParam::asc("name"));
///     let records = store.find_many(Collection::MenuItem, &query).await?;
///     Ok(records
///         .iter()
///         .filter_map(|r| r.str_field("name").map(str::to_owned))
///         .collect())
/// }
/// ```
#[async_trait]
pub trait SourceStore: Send + Sync {
    // ==================== Reads ====================

    /// Returns all records of a collection that match the query.
    async fn find_many(
        &self,
        collection: Collection,
        query: &FindMany,
    ) -> Result<Vec<StoredRecord>, StorageError>;

    /// Reads a record by ID.
    ///
    /// Returns `None` if the record does not exist; absence is not an error.
    async fn find_unique(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<StoredRecord>, StorageError>;

    // ==================== Writes ====================

    /// Creates a new record.
    ///
    /// The payload must be a JSON object. If it carries a string `id` the
    /// record is stored under that ID, otherwise the backend generates one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the ID is taken.
    async fn create(&self, collection: Collection, data: &Value)
    -> Result<StoredRecord, StorageError>;

    /// Shallow-merges `patch` into an existing record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: &Value,
    ) -> Result<StoredRecord, StorageError>;

    /// Creates the record or replaces its payload.
    async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        data: &Value,
    ) -> Result<StoredRecord, StorageError>;

    /// Deletes a record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StorageError>;

    // ==================== Transactions ====================

    /// Begins a new transaction grouping several writes.
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError>;

    // ==================== Metadata ====================

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// A group of writes applied atomically.
///
/// Operations are isolated until `commit`. Dropping a transaction without
/// committing rolls it back.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commits all operations in this transaction.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Rolls back all operations in this transaction.
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;

    /// See [`SourceStore::create`].
    async fn create(
        &mut self,
        collection: Collection,
        data: &Value,
    ) -> Result<StoredRecord, StorageError>;

    /// See [`SourceStore::update`].
    async fn update(
        &mut self,
        collection: Collection,
        id: &str,
        patch: &Value,
    ) -> Result<StoredRecord, StorageError>;

    /// See [`SourceStore::upsert`].
    async fn upsert(
        &mut self,
        collection: Collection,
        id: &str,
        data: &Value,
    ) -> Result<StoredRecord, StorageError>;

    /// See [`SourceStore::delete`].
    async fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StorageError>;

    /// Reads a record, seeing this transaction's uncommitted writes.
    async fn find_unique(
        &mut self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<StoredRecord>, StorageError>;
}

/// A store whose underlying connection can be rebuilt after it went stale.
#[async_trait]
pub trait Reconnect: Send + Sync {
    /// Drops the current connection (pool) and opens a fresh one.
    async fn reconnect(&self) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: SourceStore + ?Sized> SourceStore for std::sync::Arc<T> {
    async fn find_many(
        &self,
        collection: Collection,
        query: &FindMany,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        (**self).find_many(collection, query).await
    }

    async fn find_unique(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<StoredRecord>, StorageError> {
        (**self).find_unique(collection, id).await
    }

    async fn create(
        &self,
        collection: Collection,
        data: &Value,
    ) -> Result<StoredRecord, StorageError> {
        (**self).create(collection, data).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: &Value,
    ) -> Result<StoredRecord, StorageError> {
        (**self).update(collection, id, patch).await
    }

    async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        data: &Value,
    ) -> Result<StoredRecord, StorageError> {
        (**self).upsert(collection, id, data).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StorageError> {
        (**self).delete(collection, id).await
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError> {
        (**self).begin_transaction().await
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}

#[async_trait]
impl<T: Reconnect + ?Sized> Reconnect for std::sync::Arc<T> {
    async fn reconnect(&self) -> Result<(), StorageError> {
        (**self).reconnect().await
    }
}

/// Shallow-merges the fields of `patch` into `target`.
///
/// Both values must be JSON objects; the `id` field of `target` is kept.
pub fn merge_patch(target: &mut Value, patch: &Value) -> Result<(), StorageError> {
    let patch = patch
        .as_object()
        .ok_or_else(|| StorageError::invalid_record("patch must be a JSON object"))?;
    let target = target
        .as_object_mut()
        .ok_or_else(|| StorageError::invalid_record("record payload must be a JSON object"))?;
    for (field, value) in patch {
        if field == "id" {
            continue;
        }
        target.insert(field.clone(), value.clone());
    }
    Ok(())
}

/// Returns the payload's string `id`, or a fresh UUID when it has none.
pub fn payload_id(data: &Value) -> String {
    data.get("id")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Copies a payload and stamps `id` into it.
pub fn prepare_payload(data: &Value, id: &str) -> Result<Value, StorageError> {
    let mut payload = data.clone();
    let object = payload
        .as_object_mut()
        .ok_or_else(|| StorageError::invalid_record("record payload must be a JSON object"))?;
    object.insert("id".to_string(), Value::String(id.to_string()));
    Ok(payload)
}
