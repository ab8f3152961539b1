//! The per-entity caches handed to route handlers.
//!
//! Handlers only ever call `list`, `get_by_id` and `invalidate`; they never
//! see the store, the key layout, or whether Redis is enabled.

use std::sync::Arc;
use std::time::Duration;

use dastarkhan_storage::{DynStore, StorageError};

use crate::config::CacheConfig;
use crate::entity::{Ingredient, MenuDetail, MenuItem, Restaurant};
use crate::keys::{INGREDIENT_DETAIL, INGREDIENT_LIST, MENU_DETAIL, MENU_LIST, RESTAURANT_LIST};
use crate::repository::{CacheDeps, CachedRepository, Fetched, RefreshPolicy, RepositorySettings};
use crate::source::{
    IngredientDetailSource, IngredientListSource, MenuDetailSource, MenuListSource,
    RestaurantListSource,
};
use crate::stats::StatsSnapshot;

fn settings(
    config: &CacheConfig,
    base: &'static str,
    ttl_ms: u64,
    refresh_ahead: bool,
) -> RepositorySettings {
    RepositorySettings {
        base,
        ttl: Duration::from_millis(ttl_ms),
        memory_ttl: config.memory_ttl(ttl_ms),
        refresh: refresh_ahead.then(|| RefreshPolicy {
            threshold: config.refresh_ahead(),
            lock_ttl: config.refresh_lock_ttl(),
        }),
    }
}

/// Unwraps a list fetch; list sources always produce a value.
fn expect_list<V>(fetched: Option<Fetched<V>>, base: &str) -> Result<Fetched<V>, StorageError> {
    fetched.ok_or_else(|| StorageError::internal(format!("{base} source returned nothing")))
}

/// All menu items, sorted by name.
#[derive(Debug, Clone)]
pub struct MenuListCache {
    repo: CachedRepository<Vec<MenuItem>>,
}

impl MenuListCache {
    pub fn new(deps: CacheDeps, store: DynStore, config: &CacheConfig) -> Self {
        Self::with_settings(
            deps,
            store,
            settings(config, MENU_LIST, config.menu_list_ttl_ms, false),
        )
    }

    pub fn with_settings(deps: CacheDeps, store: DynStore, settings: RepositorySettings) -> Self {
        Self {
            repo: CachedRepository::new(settings, deps, Arc::new(MenuListSource::new(store))),
        }
    }

    pub async fn list(&self) -> Result<Arc<Vec<MenuItem>>, StorageError> {
        Ok(self.list_with_source().await?.value)
    }

    pub async fn list_with_source(&self) -> Result<Fetched<Vec<MenuItem>>, StorageError> {
        expect_list(self.repo.fetch(None).await?, MENU_LIST)
    }

    pub async fn invalidate(&self) {
        self.repo.invalidate(None).await;
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.repo.stats()
    }
}

/// One menu item with its ingredients and restaurants. Refreshes ahead.
#[derive(Debug, Clone)]
pub struct MenuDetailCache {
    repo: CachedRepository<MenuDetail>,
}

impl MenuDetailCache {
    pub fn new(deps: CacheDeps, store: DynStore, config: &CacheConfig) -> Self {
        Self::with_settings(
            deps,
            store,
            settings(config, MENU_DETAIL, config.menu_detail_ttl_ms, true),
        )
    }

    pub fn with_settings(deps: CacheDeps, store: DynStore, settings: RepositorySettings) -> Self {
        Self {
            repo: CachedRepository::new(settings, deps, Arc::new(MenuDetailSource::new(store))),
        }
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Arc<MenuDetail>>, StorageError> {
        Ok(self.get_with_source(id).await?.map(|f| f.value))
    }

    pub async fn get_with_source(
        &self,
        id: &str,
    ) -> Result<Option<Fetched<MenuDetail>>, StorageError> {
        self.repo.fetch(Some(id)).await
    }

    /// `None` invalidates every cached detail.
    pub async fn invalidate(&self, id: Option<&str>) {
        self.repo.invalidate(id).await;
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.repo.stats()
    }
}

/// All ingredients, plus single-ingredient reads that refresh ahead.
#[derive(Debug, Clone)]
pub struct IngredientListCache {
    list: CachedRepository<Vec<Ingredient>>,
    detail: CachedRepository<Ingredient>,
}

impl IngredientListCache {
    pub fn new(deps: CacheDeps, store: DynStore, config: &CacheConfig) -> Self {
        Self::with_settings(
            deps,
            store,
            settings(config, INGREDIENT_LIST, config.ingredient_ttl_ms, false),
            settings(config, INGREDIENT_DETAIL, config.ingredient_ttl_ms, true),
        )
    }

    pub fn with_settings(
        deps: CacheDeps,
        store: DynStore,
        list: RepositorySettings,
        detail: RepositorySettings,
    ) -> Self {
        Self {
            list: CachedRepository::new(
                list,
                deps.clone(),
                Arc::new(IngredientListSource::new(Arc::clone(&store))),
            ),
            detail: CachedRepository::new(
                detail,
                deps,
                Arc::new(IngredientDetailSource::new(store)),
            ),
        }
    }

    pub async fn list(&self) -> Result<Arc<Vec<Ingredient>>, StorageError> {
        Ok(self.list_with_source().await?.value)
    }

    pub async fn list_with_source(&self) -> Result<Fetched<Vec<Ingredient>>, StorageError> {
        expect_list(self.list.fetch(None).await?, INGREDIENT_LIST)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Arc<Ingredient>>, StorageError> {
        Ok(self.detail.fetch(Some(id)).await?.map(|f| f.value))
    }

    pub async fn get_with_source(
        &self,
        id: &str,
    ) -> Result<Option<Fetched<Ingredient>>, StorageError> {
        self.detail.fetch(Some(id)).await
    }

    /// `None` invalidates the list and every cached ingredient; `Some`
    /// invalidates the list and that one ingredient.
    pub async fn invalidate(&self, id: Option<&str>) {
        self.list.invalidate(None).await;
        self.detail.invalidate(id).await;
    }

    pub fn stats(&self) -> Vec<StatsSnapshot> {
        vec![self.list.stats(), self.detail.stats()]
    }
}

/// All restaurants with the menu items they serve.
#[derive(Debug, Clone)]
pub struct RestaurantListCache {
    repo: CachedRepository<Vec<Restaurant>>,
}

impl RestaurantListCache {
    pub fn new(deps: CacheDeps, store: DynStore, config: &CacheConfig) -> Self {
        Self::with_settings(
            deps,
            store,
            settings(config, RESTAURANT_LIST, config.restaurant_list_ttl_ms, false),
        )
    }

    pub fn with_settings(deps: CacheDeps, store: DynStore, settings: RepositorySettings) -> Self {
        Self {
            repo: CachedRepository::new(
                settings,
                deps,
                Arc::new(RestaurantListSource::new(store)),
            ),
        }
    }

    pub async fn list(&self) -> Result<Arc<Vec<Restaurant>>, StorageError> {
        Ok(self.list_with_source().await?.value)
    }

    pub async fn list_with_source(&self) -> Result<Fetched<Vec<Restaurant>>, StorageError> {
        expect_list(self.repo.fetch(None).await?, RESTAURANT_LIST)
    }

    pub async fn invalidate(&self) {
        self.repo.invalidate(None).await;
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.repo.stats()
    }
}
