//! Explicit wiring of the process-wide collaborators.
//!
//! ```text
//! handlers → CacheLayer ─┬─ SharedKv (Redis | disabled)
//!                        └─ ObservedStore → RetryingStore → Postgres | memory
//!                                 └─ CacheInvalidator
//! ```

use std::sync::Arc;

use anyhow::Context;
use dastarkhan_cache::{
    CacheDeps, CacheInvalidator, CacheLayer, LastSyncMarker, SharedKv, create_kv_store,
};
use dastarkhan_db_memory::create_memory_store;
use dastarkhan_db_postgres::PostgresStore;
use dastarkhan_storage::{DynStore, ObservedStore, Reconnect, RetryingStore, SourceStore};
use tracing::{info, warn};

use crate::config::AppConfig;

/// Everything a request handler needs. Built once at startup.
pub struct AppContext {
    /// The source store. Writes through it invalidate the cache.
    pub store: DynStore,
    pub cache: CacheLayer,
}

impl AppContext {
    /// Connects the configured store and Redis.
    pub async fn build(config: &AppConfig) -> anyhow::Result<Self> {
        let kv = create_kv_store(&config.redis).await;

        let ctx = match config.storage.postgres() {
            Some(pg) => {
                let store = PostgresStore::connect(pg)
                    .await
                    .context("failed to connect to PostgreSQL")?;
                Self::from_parts(config, store, kv)
            }
            None => {
                warn!("storage.postgres_url not set, using the in-memory store");
                Self::from_parts(config, create_memory_store(), kv)
            }
        };

        info!(
            store = ctx.store.backend_name(),
            kv = ctx.cache.deps().kv.backend_name(),
            "Application context ready"
        );
        Ok(ctx)
    }

    /// Wires the cache layer over an already connected store.
    pub fn from_parts<S>(config: &AppConfig, source: S, kv: SharedKv) -> Self
    where
        S: SourceStore + Reconnect + 'static,
    {
        let deps = CacheDeps::new(kv, config.cache.max_concurrent_refreshes);
        let last_sync = Arc::new(LastSyncMarker::new());
        let invalidator = Arc::new(CacheInvalidator::new(
            deps.keys.clone(),
            Arc::clone(&last_sync),
        ));
        let store: DynStore = Arc::new(ObservedStore::new(
            RetryingStore::with_backoff(source, config.cache.retry_backoff()),
            invalidator,
        ));
        let cache = CacheLayer::new(deps, Arc::clone(&store), &config.cache, last_sync);
        Self { store, cache }
    }
}
