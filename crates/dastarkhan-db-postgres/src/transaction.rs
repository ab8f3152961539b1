//! PostgreSQL transaction wrapper.

use async_trait::async_trait;
use serde_json::Value;
use sqlx_postgres::PgTransaction;
use tokio::sync::Mutex;

use dastarkhan_storage::{
    Collection, StorageError, StoredRecord, Transaction, payload_id, prepare_payload,
};

use crate::queries;

/// Wraps an sqlx transaction.
///
/// The sqlx transaction is held in a `Mutex` only to make the wrapper
/// `Sync`; every operation has exclusive access already and uses
/// `get_mut`. sqlx rolls the transaction back if it is dropped unfinished.
pub struct PostgresTransaction {
    tx: Mutex<Option<PgTransaction<'static>>>,
}

impl PostgresTransaction {
    /// Creates a new PostgreSQL transaction wrapper.
    pub fn new(tx: PgTransaction<'static>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    fn open(&mut self) -> Result<&mut PgTransaction<'static>, StorageError> {
        self.tx
            .get_mut()
            .as_mut()
            .ok_or_else(|| StorageError::transaction("Transaction already completed"))
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        // Drop is implemented, so take the inner transaction instead of moving it out
        let mut this = self;
        if let Some(tx) = this.tx.get_mut().take() {
            tx.commit().await.map_err(|e| {
                StorageError::transaction(format!("Failed to commit transaction: {e}"))
            })?;
            tracing::debug!("Transaction committed");
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        let mut this = self;
        if let Some(tx) = this.tx.get_mut().take() {
            tx.rollback().await.map_err(|e| {
                StorageError::transaction(format!("Failed to roll back transaction: {e}"))
            })?;
            tracing::debug!("Transaction rolled back");
        }
        Ok(())
    }

    async fn create(
        &mut self,
        collection: Collection,
        data: &Value,
    ) -> Result<StoredRecord, StorageError> {
        let id = payload_id(data);
        let payload = prepare_payload(data, &id)?;
        let tx = self.open()?;
        queries::insert(&mut **tx, collection, &id, &payload).await
    }

    async fn update(
        &mut self,
        collection: Collection,
        id: &str,
        patch: &Value,
    ) -> Result<StoredRecord, StorageError> {
        let tx = self.open()?;
        queries::update(&mut **tx, collection, id, patch).await
    }

    async fn upsert(
        &mut self,
        collection: Collection,
        id: &str,
        data: &Value,
    ) -> Result<StoredRecord, StorageError> {
        let payload = prepare_payload(data, id)?;
        let tx = self.open()?;
        queries::upsert(&mut **tx, collection, id, &payload).await
    }

    async fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StorageError> {
        let tx = self.open()?;
        queries::delete(&mut **tx, collection, id).await
    }

    async fn find_unique(
        &mut self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<StoredRecord>, StorageError> {
        let tx = self.open()?;
        queries::find_unique(&mut **tx, collection, id).await
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if self.tx.get_mut().is_some() {
            tracing::warn!("Transaction dropped without commit or rollback, rolling back");
        }
    }
}
