//! ObservedStore - a store wrapper that reports writes after they succeed.
//!
//! This wrapper delegates all operations to an inner store and hands every
//! successful write to a [`MutationObserver`]. The cache layer plugs its
//! invalidator in here, so callers perform ordinary writes and never talk to
//! the cache themselves.
//!
//! # Example
//!
//! ```ignore
//! use dastarkhan_storage::ObservedStore;
//!
//! let store = ObservedStore::new(postgres_store, invalidator);
//!
//! // After this returns, the observer has seen the MenuItem update
//! store.update(Collection::MenuItem, "osh", &json!({"name": "Osh Plov"})).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::StorageError;
use crate::traits::{SourceStore, Transaction};
use crate::types::{Collection, FindMany, Mutation, MutationKind, StoredRecord};

/// Receives writes that have been applied to the source store.
///
/// Observers cannot fail the write: `on_mutations` returns nothing, so any
/// error must be handled (and logged) inside the observer.
#[async_trait]
pub trait MutationObserver: Send + Sync {
    /// Called once per successful write, or once per committed transaction.
    async fn on_mutations(&self, mutations: &[Mutation]);
}

/// A store wrapper that notifies an observer after successful writes.
///
/// Notifications happen **after** the inner store returned success, and the
/// result handed back to the caller is always the inner store's result.
pub struct ObservedStore<S: SourceStore> {
    inner: S,
    observer: Arc<dyn MutationObserver>,
}

impl<S: SourceStore> ObservedStore<S> {
    /// Create a new observed store wrapper.
    pub fn new(inner: S, observer: Arc<dyn MutationObserver>) -> Self {
        Self { inner, observer }
    }

    /// Get a reference to the inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn notify(&self, mutation: Mutation) {
        debug!(
            collection = %mutation.collection,
            kind = %mutation.kind,
            id = ?mutation.id,
            "Observed write"
        );
        self.observer.on_mutations(std::slice::from_ref(&mutation)).await;
    }
}

#[async_trait]
impl<S: SourceStore> SourceStore for ObservedStore<S> {
    async fn find_many(
        &self,
        collection: Collection,
        query: &FindMany,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        self.inner.find_many(collection, query).await
    }

    async fn find_unique(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<StoredRecord>, StorageError> {
        self.inner.find_unique(collection, id).await
    }

    async fn create(
        &self,
        collection: Collection,
        data: &Value,
    ) -> Result<StoredRecord, StorageError> {
        let record = self.inner.create(collection, data).await?;
        self.notify(Mutation::new(collection, MutationKind::Create, &record.id))
            .await;
        Ok(record)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: &Value,
    ) -> Result<StoredRecord, StorageError> {
        let record = self.inner.update(collection, id, patch).await?;
        self.notify(Mutation::new(collection, MutationKind::Update, id))
            .await;
        Ok(record)
    }

    async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        data: &Value,
    ) -> Result<StoredRecord, StorageError> {
        let record = self.inner.upsert(collection, id, data).await?;
        self.notify(Mutation::new(collection, MutationKind::Upsert, id))
            .await;
        Ok(record)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StorageError> {
        self.inner.delete(collection, id).await?;
        self.notify(Mutation::new(collection, MutationKind::Delete, id))
            .await;
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError> {
        let inner_tx = self.inner.begin_transaction().await?;
        Ok(Box::new(ObservedTransaction::new(
            inner_tx,
            self.observer.clone(),
        )))
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

impl<S: SourceStore> std::fmt::Debug for ObservedStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservedStore")
            .field("backend", &self.inner.backend_name())
            .finish()
    }
}

// ============================================================================
// ObservedTransaction
// ============================================================================

/// A transaction wrapper that collects writes and reports them on commit.
///
/// Nothing is reported for a rolled back or dropped transaction.
pub struct ObservedTransaction {
    inner: Box<dyn Transaction>,
    observer: Arc<dyn MutationObserver>,
    pending: Vec<Mutation>,
}

impl ObservedTransaction {
    /// Create a new observed transaction.
    pub fn new(inner: Box<dyn Transaction>, observer: Arc<dyn MutationObserver>) -> Self {
        Self {
            inner,
            observer,
            pending: Vec::new(),
        }
    }
}

#[async_trait]
impl Transaction for ObservedTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let ObservedTransaction {
            inner,
            observer,
            pending,
        } = *self;

        inner.commit().await?;

        if !pending.is_empty() {
            debug!(count = pending.len(), "Reporting committed transaction writes");
            observer.on_mutations(&pending).await;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.inner.rollback().await
    }

    async fn create(
        &mut self,
        collection: Collection,
        data: &Value,
    ) -> Result<StoredRecord, StorageError> {
        let record = self.inner.create(collection, data).await?;
        self.pending
            .push(Mutation::new(collection, MutationKind::Create, &record.id));
        Ok(record)
    }

    async fn update(
        &mut self,
        collection: Collection,
        id: &str,
        patch: &Value,
    ) -> Result<StoredRecord, StorageError> {
        let record = self.inner.update(collection, id, patch).await?;
        self.pending
            .push(Mutation::new(collection, MutationKind::Update, id));
        Ok(record)
    }

    async fn upsert(
        &mut self,
        collection: Collection,
        id: &str,
        data: &Value,
    ) -> Result<StoredRecord, StorageError> {
        let record = self.inner.upsert(collection, id, data).await?;
        self.pending
            .push(Mutation::new(collection, MutationKind::Upsert, id));
        Ok(record)
    }

    async fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StorageError> {
        self.inner.delete(collection, id).await?;
        self.pending
            .push(Mutation::new(collection, MutationKind::Delete, id));
        Ok(())
    }

    async fn find_unique(
        &mut self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<StoredRecord>, StorageError> {
        self.inner.find_unique(collection, id).await
    }
}

impl std::fmt::Debug for ObservedTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservedTransaction")
            .field("pending", &self.pending.len())
            .finish()
    }
}
