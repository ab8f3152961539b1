//! PostgreSQL source store.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde_json::Value;
use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use dastarkhan_storage::{
    Collection, FindMany, Reconnect, SourceStore, StorageError, StoredRecord, Transaction,
    payload_id, prepare_payload,
};

use crate::config::PostgresConfig;
use crate::error::{Result, classify};
use crate::pool::{create_pool, mask_password};
use crate::transaction::PostgresTransaction;
use crate::{migrations, queries};

/// Source store backed by one JSONB table per collection.
///
/// The pool sits behind an [`ArcSwap`] so that [`Reconnect::reconnect`] can
/// replace it while other requests still hold the old one.
pub struct PostgresStore {
    pool: ArcSwap<PgPool>,
    config: PostgresConfig,
}

impl PostgresStore {
    /// Connects to the database and, if configured, applies migrations.
    #[instrument(skip(config), fields(url = %mask_password(&config.url)))]
    pub async fn connect(config: PostgresConfig) -> Result<Self> {
        let pool = create_pool(&config).await?;
        if config.run_migrations {
            migrations::run(&pool).await?;
        }
        info!("PostgreSQL source store ready");
        Ok(Self {
            pool: ArcSwap::from_pointee(pool),
            config,
        })
    }

    /// Wraps an existing pool. Migrations are not run.
    pub fn from_pool(pool: PgPool, config: PostgresConfig) -> Self {
        Self {
            pool: ArcSwap::from_pointee(pool),
            config,
        }
    }

    /// Returns the current pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.load_full()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }
}

#[async_trait]
impl SourceStore for PostgresStore {
    async fn find_many(
        &self,
        collection: Collection,
        query: &FindMany,
    ) -> std::result::Result<Vec<StoredRecord>, StorageError> {
        let pool = self.pool();
        queries::find_many(&*pool, collection, query).await
    }

    async fn find_unique(
        &self,
        collection: Collection,
        id: &str,
    ) -> std::result::Result<Option<StoredRecord>, StorageError> {
        let pool = self.pool();
        queries::find_unique(&*pool, collection, id).await
    }

    async fn create(
        &self,
        collection: Collection,
        data: &Value,
    ) -> std::result::Result<StoredRecord, StorageError> {
        let id = payload_id(data);
        let payload = prepare_payload(data, &id)?;
        let pool = self.pool();
        queries::insert(&*pool, collection, &id, &payload).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: &Value,
    ) -> std::result::Result<StoredRecord, StorageError> {
        let pool = self.pool();
        queries::update(&*pool, collection, id, patch).await
    }

    async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        data: &Value,
    ) -> std::result::Result<StoredRecord, StorageError> {
        let payload = prepare_payload(data, id)?;
        let pool = self.pool();
        queries::upsert(&*pool, collection, id, &payload).await
    }

    async fn delete(
        &self,
        collection: Collection,
        id: &str,
    ) -> std::result::Result<(), StorageError> {
        let pool = self.pool();
        queries::delete(&*pool, collection, id).await
    }

    async fn begin_transaction(
        &self,
    ) -> std::result::Result<Box<dyn Transaction>, StorageError> {
        let tx = self.pool().begin().await.map_err(classify)?;
        Ok(Box::new(PostgresTransaction::new(tx)))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl Reconnect for PostgresStore {
    #[instrument(skip(self))]
    async fn reconnect(&self) -> std::result::Result<(), StorageError> {
        let fresh = create_pool(&self.config).await?;
        let stale = self.pool.swap(Arc::new(fresh));
        info!("PostgreSQL pool replaced");

        // In-flight queries keep their own handle; close once they are done.
        tokio::spawn(async move {
            stale.close().await;
        });
        Ok(())
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pool = self.pool.load();
        f.debug_struct("PostgresStore")
            .field("url", &mask_password(&self.config.url))
            .field("pool_size", &pool.size())
            .field("closed", &pool.is_closed())
            .finish()
    }
}
