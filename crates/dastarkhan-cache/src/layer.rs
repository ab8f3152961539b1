//! All repositories of one process, wired over shared collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use dastarkhan_storage::DynStore;

use crate::config::CacheConfig;
use crate::invalidation::LastSyncMarker;
use crate::repos::{IngredientListCache, MenuDetailCache, MenuListCache, RestaurantListCache};
use crate::repository::CacheDeps;
use crate::stats::StatsSnapshot;

/// The per-entity caches plus what the status endpoint reports on.
#[derive(Debug, Clone)]
pub struct CacheLayer {
    pub menu: MenuListCache,
    pub menu_detail: MenuDetailCache,
    pub ingredients: IngredientListCache,
    pub restaurants: RestaurantListCache,
    deps: CacheDeps,
    last_sync: Arc<LastSyncMarker>,
}

/// Snapshot served by `GET /cache/status`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub backend: &'static str,
    pub enabled: bool,
    pub reachable: bool,
    pub versions: BTreeMap<&'static str, u64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sync: Option<OffsetDateTime>,
    pub refreshes_in_flight: usize,
    pub repositories: Vec<StatsSnapshot>,
}

impl CacheLayer {
    /// `store` is what repositories read from; writes that should
    /// invalidate must go through the `ObservedStore` feeding `last_sync`.
    pub fn new(
        deps: CacheDeps,
        store: DynStore,
        config: &CacheConfig,
        last_sync: Arc<LastSyncMarker>,
    ) -> Self {
        Self {
            menu: MenuListCache::new(deps.clone(), Arc::clone(&store), config),
            menu_detail: MenuDetailCache::new(deps.clone(), Arc::clone(&store), config),
            ingredients: IngredientListCache::new(deps.clone(), Arc::clone(&store), config),
            restaurants: RestaurantListCache::new(deps.clone(), store, config),
            deps,
            last_sync,
        }
    }

    pub fn deps(&self) -> &CacheDeps {
        &self.deps
    }

    pub fn last_sync(&self) -> Option<OffsetDateTime> {
        self.last_sync.get()
    }

    pub async fn status(&self) -> CacheStatus {
        let kv = &self.deps.kv;
        let mut repositories = vec![self.menu.stats(), self.menu_detail.stats()];
        repositories.extend(self.ingredients.stats());
        repositories.push(self.restaurants.stats());

        CacheStatus {
            backend: kv.backend_name(),
            enabled: kv.is_enabled(),
            reachable: kv.ping().await,
            versions: self.deps.keys.snapshot().await.into_iter().collect(),
            last_sync: self.last_sync.get(),
            refreshes_in_flight: self.deps.refresher.in_flight(),
            repositories,
        }
    }

    /// Waits for background refreshes to finish.
    pub async fn shutdown(&self) {
        tracing::info!(
            in_flight = self.deps.refresher.in_flight(),
            "Waiting for cache refreshes"
        );
        self.deps.refresher.wait_idle().await;
    }
}
