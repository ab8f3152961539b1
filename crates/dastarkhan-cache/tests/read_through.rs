//! End-to-end behavior of the cache core over the in-memory source store.
//!
//! Writes go through `ObservedStore(RetryingStore(InMemoryStore))` with the
//! cache invalidator attached, exactly as the server wires it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dastarkhan_cache::codec;
use dastarkhan_cache::keys::{INGREDIENT_DETAIL, MENU_DETAIL, MENU_LIST, RESTAURANT_LIST};
use dastarkhan_cache::source::{IngredientDetailSource, MenuDetailSource};
use dastarkhan_cache::{
    CacheConfig, CacheDeps, CacheInvalidator, CacheLayer, Cacheable, CachedRepository,
    DisabledStore, EntitySource, Ingredient, KeyTtl, KeyValueStore, LastSyncMarker, MemoryStore,
    MenuDetail, RefreshPolicy, RepositorySettings, SharedKv, Tier, VersionedKeys,
};
use dastarkhan_db_memory::InMemoryStore;
use dastarkhan_storage::{
    Collection, DynStore, ObservedStore, RetryingStore, SourceStore, StorageError,
};
use serde_json::json;
use tokio::sync::Notify;

struct Harness {
    db: Arc<InMemoryStore>,
    store: DynStore,
    keys: VersionedKeys,
    layer: CacheLayer,
}

fn config(memory_ttl_ms: u64) -> CacheConfig {
    CacheConfig {
        memory_ttl_ms,
        retry_backoff_ms: 1,
        ..Default::default()
    }
}

fn harness(kv: SharedKv, config: CacheConfig) -> Harness {
    let db = Arc::new(InMemoryStore::new());
    let deps = CacheDeps::new(Arc::clone(&kv), config.max_concurrent_refreshes);
    let last_sync = Arc::new(LastSyncMarker::new());
    let invalidator = Arc::new(CacheInvalidator::new(
        deps.keys.clone(),
        Arc::clone(&last_sync),
    ));
    let store: DynStore = Arc::new(ObservedStore::new(
        RetryingStore::with_backoff(Arc::clone(&db), config.retry_backoff()),
        invalidator,
    ));
    let layer = CacheLayer::new(deps.clone(), Arc::clone(&store), &config, last_sync);
    Harness {
        db,
        store,
        keys: deps.keys,
        layer,
    }
}

async fn seed_menu(db: &InMemoryStore) {
    for (id, name, price) in [
        ("somsa", "Somsa", 1500),
        ("osh", "Osh", 4500),
        ("mastava", "Mastava", 3200),
    ] {
        db.create(
            Collection::MenuItem,
            &json!({"id": id, "name": name, "priceCents": price}),
        )
        .await
        .unwrap();
    }
    for (id, name) in [("rice", "Rice"), ("carrot", "Carrot"), ("lamb", "Lamb")] {
        db.create(Collection::Ingredient, &json!({"id": id, "name": name}))
            .await
            .unwrap();
    }
    for (id, item, ingredient) in [
        ("osh-rice", "osh", "rice"),
        ("osh-carrot", "osh", "carrot"),
        ("osh-lamb", "osh", "lamb"),
    ] {
        db.create(
            Collection::MenuItemIngredient,
            &json!({"id": id, "menuItemId": item, "ingredientId": ingredient}),
        )
        .await
        .unwrap();
    }
    db.create(
        Collection::Restaurant,
        &json!({"id": "chaikhana", "name": "Chaikhana"}),
    )
    .await
    .unwrap();
    db.create(
        Collection::MenuItemOnRestaurant,
        &json!({"id": "chaikhana-osh", "menuItemId": "osh", "restaurantId": "chaikhana"}),
    )
    .await
    .unwrap();
    db.reset_read_count();
}

fn names(items: &[dastarkhan_cache::MenuItem]) -> Vec<&str> {
    items.iter().map(|i| i.name.as_str()).collect()
}

/// Reads its row, then holds the result until released.
///
/// Lets a test slip a write in between a load and the cache write that
/// follows it.
struct StallingSource<V> {
    inner: Arc<dyn EntitySource<V>>,
    armed: AtomicBool,
    loaded: Notify,
    release: Notify,
}

impl<V: Cacheable> StallingSource<V> {
    fn new(inner: Arc<dyn EntitySource<V>>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            armed: AtomicBool::new(false),
            loaded: Notify::new(),
            release: Notify::new(),
        })
    }

    fn arm(&self, armed: bool) {
        self.armed.store(armed, Ordering::SeqCst);
    }
}

#[async_trait]
impl<V: Cacheable> EntitySource<V> for StallingSource<V> {
    async fn load(&self, id: Option<&str>) -> Result<Option<V>, StorageError> {
        let value = self.inner.load(id).await?;
        if self.armed.load(Ordering::SeqCst) {
            self.loaded.notify_one();
            self.release.notified().await;
        }
        Ok(value)
    }
}

fn detail_settings(base: &'static str, refresh: Option<RefreshPolicy>) -> RepositorySettings {
    RepositorySettings {
        base,
        ttl: Duration::from_secs(300),
        memory_ttl: Duration::ZERO,
        refresh,
    }
}

#[tokio::test]
async fn test_cold_list_then_memory_hit() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv.clone(), config(30_000));
    seed_menu(&h.db).await;

    let cold = h.layer.menu.list_with_source().await.unwrap();
    assert_eq!(cold.source, Tier::Store);
    assert_eq!(names(&cold.value), vec!["Mastava", "Osh", "Somsa"]);
    assert_eq!(h.db.read_count(), 1);

    h.db.reset_read_count();
    kv.reset_calls();
    let warm = h.layer.menu.list_with_source().await.unwrap();
    assert_eq!(warm.source, Tier::Memory);
    assert!(Arc::ptr_eq(&cold.value, &warm.value));
    assert_eq!(h.db.read_count(), 0);
    assert_eq!(kv.calls(), 0);
}

#[tokio::test]
async fn test_distributed_hit_populates_memory() {
    let kv = Arc::new(MemoryStore::new());
    let first = harness(kv.clone(), config(30_000));
    seed_menu(&first.db).await;
    first.layer.menu.list().await.unwrap();

    // A second process sharing the same Redis but not the same memory
    let second = harness(kv.clone(), config(30_000));
    seed_menu(&second.db).await;
    let fetched = second.layer.menu.list_with_source().await.unwrap();
    assert_eq!(fetched.source, Tier::Distributed);
    assert_eq!(second.db.read_count(), 0);

    let again = second.layer.menu.list_with_source().await.unwrap();
    assert_eq!(again.source, Tier::Memory);
}

#[tokio::test]
async fn test_update_bumps_version_once_and_list_reflects_it() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv.clone(), config(0));
    seed_menu(&h.db).await;

    h.layer.menu.list().await.unwrap();
    let before = h.keys.current(MENU_LIST).await.unwrap();

    h.store
        .update(Collection::MenuItem, "osh", &json!({"name": "Osh Plov"}))
        .await
        .unwrap();

    assert_eq!(h.keys.current(MENU_LIST).await.unwrap(), before + 1);
    let after = h.layer.menu.list_with_source().await.unwrap();
    assert_eq!(after.source, Tier::Store);
    assert_eq!(names(&after.value), vec!["Mastava", "Osh Plov", "Somsa"]);
    assert!(h.layer.last_sync().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_memory_tier_is_stale_until_its_ttl_lapses() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv, config(30_000));
    seed_menu(&h.db).await;
    h.layer.menu.list().await.unwrap();

    h.store
        .update(Collection::MenuItem, "osh", &json!({"name": "Osh Plov"}))
        .await
        .unwrap();

    // Writes do not reach the memory tier
    let stale = h.layer.menu.list_with_source().await.unwrap();
    assert_eq!(stale.source, Tier::Memory);
    assert!(names(&stale.value).contains(&"Osh"));

    tokio::time::advance(Duration::from_secs(30)).await;
    let fresh = h.layer.menu.list_with_source().await.unwrap();
    assert_eq!(fresh.source, Tier::Store);
    assert!(names(&fresh.value).contains(&"Osh Plov"));
}

#[tokio::test]
async fn test_old_version_key_never_read_after_invalidation() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv.clone(), config(0));
    seed_menu(&h.db).await;
    h.layer.menu.list().await.unwrap();
    assert!(kv.peek("menu:list:v:0").is_some());

    // Changed behind the cache's back, then invalidated explicitly
    h.db.update(Collection::MenuItem, "somsa", &json!({"name": "Samsa"}))
        .await
        .unwrap();
    h.layer.menu.invalidate().await;

    let fetched = h.layer.menu.list_with_source().await.unwrap();
    assert_eq!(fetched.source, Tier::Store);
    assert_eq!(names(&fetched.value), vec!["Mastava", "Osh", "Samsa"]);
    // The orphan is still there until its TTL, just never looked up
    assert!(kv.peek("menu:list:v:0").is_some());
    assert!(kv.peek("menu:list:v:1").is_some());
}

#[tokio::test]
async fn test_invalidating_empty_collection_still_bumps() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv.clone(), config(30_000));

    h.layer.restaurants.invalidate().await;
    h.layer.restaurants.invalidate().await;
    assert_eq!(h.keys.current(RESTAURANT_LIST).await.unwrap(), 2);
    assert!(kv.keys("restaurant:list:v:*").is_empty());
}

#[tokio::test]
async fn test_refresh_ahead_runs_once_for_concurrent_near_expiry_reads() {
    let kv = Arc::new(MemoryStore::new());
    let config = CacheConfig {
        menu_detail_ttl_ms: 5 * 60 * 1000,
        refresh_ahead_ms: 2 * 60 * 1000,
        ..config(0)
    };
    let h = harness(kv.clone(), config);
    seed_menu(&h.db).await;

    let cold = h
        .layer
        .menu_detail
        .get_with_source("osh")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cold.source, Tier::Store);
    let per_load = h.db.read_count();
    assert!(per_load > 0);

    let key = "menu:detail:v:0:id:osh";
    assert!(kv.expire_in(key, Duration::from_secs(60)));
    h.db.reset_read_count();

    let (a, b) = tokio::join!(
        h.layer.menu_detail.get_with_source("osh"),
        h.layer.menu_detail.get_with_source("osh"),
    );
    assert_eq!(a.unwrap().unwrap().source, Tier::Distributed);
    assert_eq!(b.unwrap().unwrap().source, Tier::Distributed);

    h.layer.deps().refresher.wait_idle().await;
    assert_eq!(h.db.read_count(), per_load);

    let stats = h.layer.menu_detail.stats();
    assert_eq!(stats.refreshes_started, 1);
    assert_eq!(stats.refreshes_skipped, 1);
    assert!(kv.peek("menu:detail:refreshing:osh").is_none());
    match kv.ttl(key).await.unwrap() {
        KeyTtl::Expires(remaining) => assert!(remaining > Duration::from_secs(120)),
        other => panic!("refreshed entry should expire, got {other:?}"),
    }
}

#[tokio::test]
async fn test_refresh_racing_a_write_cannot_publish_old_row() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv.clone(), config(0));
    seed_menu(&h.db).await;

    let deps = CacheDeps::new(kv.clone(), 4);
    let inner = Arc::new(IngredientDetailSource::new(Arc::clone(&h.store)));
    let source = StallingSource::<Ingredient>::new(inner);
    let policy = RefreshPolicy {
        threshold: Duration::from_secs(120),
        lock_ttl: Duration::from_secs(10),
    };
    let repo: CachedRepository<Ingredient> = CachedRepository::new(
        detail_settings(INGREDIENT_DETAIL, Some(policy)),
        deps.clone(),
        source.clone(),
    );

    repo.fetch(Some("rice")).await.unwrap();
    assert!(kv.expire_in("ingredient:detail:v:0:id:rice", Duration::from_secs(60)));

    // The refresh snapshots "Rice" and stalls before writing it back
    source.arm(true);
    let served = repo.fetch(Some("rice")).await.unwrap().unwrap();
    assert_eq!(served.source, Tier::Distributed);
    source.loaded.notified().await;

    h.store
        .update(Collection::Ingredient, "rice", &json!({"name": "Basmati"}))
        .await
        .unwrap();
    assert_eq!(h.keys.current(INGREDIENT_DETAIL).await.unwrap(), 1);

    source.arm(false);
    source.release.notify_one();
    deps.refresher.wait_idle().await;

    let fetched = repo.fetch(Some("rice")).await.unwrap().unwrap();
    assert_eq!(fetched.value.name, "Basmati");
    assert_eq!(fetched.source, Tier::Store);

    // The stale row only ever reached the orphaned version
    let orphan = kv.peek("ingredient:detail:v:0:id:rice").unwrap();
    let orphan: Ingredient = codec::decode("ingredient:detail:v:0:id:rice", &orphan).unwrap();
    assert_eq!(orphan.name, "Rice");
}

#[tokio::test]
async fn test_cold_miss_racing_a_menu_item_write_cannot_publish_old_row() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv.clone(), config(0));
    seed_menu(&h.db).await;

    let inner = Arc::new(MenuDetailSource::new(Arc::clone(&h.store)));
    let source = StallingSource::<MenuDetail>::new(inner);
    let repo: CachedRepository<MenuDetail> = CachedRepository::new(
        detail_settings(MENU_DETAIL, None),
        CacheDeps::new(kv.clone(), 4),
        source.clone(),
    );

    source.arm(true);
    let in_flight = tokio::spawn({
        let repo = repo.clone();
        async move { repo.fetch(Some("osh")).await }
    });
    source.loaded.notified().await;

    h.store
        .update(Collection::MenuItem, "osh", &json!({"priceCents": 4900}))
        .await
        .unwrap();
    source.arm(false);
    source.release.notify_one();

    let stale = in_flight.await.unwrap().unwrap().unwrap();
    assert_eq!(stale.value.item.price_cents, 4500);

    let fresh = repo.fetch(Some("osh")).await.unwrap().unwrap();
    assert_eq!(fresh.source, Tier::Store);
    assert_eq!(fresh.value.item.price_cents, 4900);
    let again = repo.fetch(Some("osh")).await.unwrap().unwrap();
    assert_eq!(again.source, Tier::Distributed);
    assert_eq!(again.value.item.price_cents, 4900);
}

#[tokio::test(start_paused = true)]
async fn test_default_config_refreshes_ahead_on_a_single_busy_node() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv, CacheConfig::default());
    seed_menu(&h.db).await;

    // One read every 30s for five and a half minutes
    let mut sources = Vec::new();
    for _ in 0..12 {
        let fetched = h
            .layer
            .menu_detail
            .get_with_source("osh")
            .await
            .unwrap()
            .unwrap();
        sources.push(fetched.source);
        h.layer.deps().refresher.wait_idle().await;
        tokio::time::advance(Duration::from_secs(30)).await;
    }

    assert_eq!(sources[0], Tier::Store);
    assert!(sources.contains(&Tier::Distributed), "{sources:?}");
    assert!(
        !sources[1..].contains(&Tier::Store),
        "entry expired before a refresh: {sources:?}"
    );
    assert!(h.layer.menu_detail.stats().refreshes_started >= 1);
}

#[tokio::test]
async fn test_not_found_is_never_cached() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv.clone(), config(30_000));
    seed_menu(&h.db).await;

    assert!(h.layer.menu_detail.get_by_id("plov").await.unwrap().is_none());
    assert!(h.layer.menu_detail.get_by_id("plov").await.unwrap().is_none());
    assert_eq!(h.db.read_count(), 2);
    assert!(kv.keys("menu:detail:*:id:plov").is_empty());
}

#[tokio::test]
async fn test_menu_detail_joins_links() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv, config(30_000));
    seed_menu(&h.db).await;

    let detail = h.layer.menu_detail.get_by_id("osh").await.unwrap().unwrap();
    assert_eq!(detail.item.name, "Osh");
    let ingredients: Vec<_> = detail.ingredients.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(ingredients, vec!["Carrot", "Lamb", "Rice"]);
    assert_eq!(detail.restaurant_ids, vec!["chaikhana"]);

    let restaurants = h.layer.restaurants.list().await.unwrap();
    assert_eq!(restaurants[0].menu_item_ids, vec!["osh"]);
}

#[tokio::test]
async fn test_menu_item_write_bumps_detail_version() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv.clone(), config(0));
    seed_menu(&h.db).await;

    h.layer.menu_detail.get_by_id("osh").await.unwrap();

    h.store
        .update(Collection::MenuItem, "osh", &json!({"priceCents": 4900}))
        .await
        .unwrap();

    assert_eq!(h.keys.current(MENU_DETAIL).await.unwrap(), 1);
    // The old entry is orphaned, not deleted
    assert!(kv.peek("menu:detail:v:0:id:osh").is_some());

    let detail = h
        .layer
        .menu_detail
        .get_with_source("osh")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.source, Tier::Store);
    assert_eq!(detail.value.item.price_cents, 4900);
    assert!(kv.peek("menu:detail:v:1:id:osh").is_some());
}

#[tokio::test]
async fn test_link_write_invalidates_both_lists() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv, config(0));
    seed_menu(&h.db).await;

    h.store
        .create(
            Collection::MenuItemOnRestaurant,
            &json!({"menuItemId": "somsa", "restaurantId": "chaikhana"}),
        )
        .await
        .unwrap();

    assert_eq!(h.keys.current(RESTAURANT_LIST).await.unwrap(), 1);
    assert_eq!(h.keys.current(MENU_LIST).await.unwrap(), 1);
    assert_eq!(h.keys.current(MENU_DETAIL).await.unwrap(), 1);
    let restaurants = h.layer.restaurants.list().await.unwrap();
    assert_eq!(restaurants[0].menu_item_ids, vec!["osh", "somsa"]);
}

#[tokio::test]
async fn test_transaction_invalidates_once_on_commit_only() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv, config(0));
    seed_menu(&h.db).await;

    let mut tx = h.store.begin_transaction().await.unwrap();
    tx.update(Collection::MenuItem, "osh", &json!({"priceCents": 1}))
        .await
        .unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(h.keys.current(MENU_LIST).await.unwrap(), 0);

    let mut tx = h.store.begin_transaction().await.unwrap();
    tx.update(Collection::MenuItem, "osh", &json!({"priceCents": 1}))
        .await
        .unwrap();
    tx.update(Collection::MenuItem, "somsa", &json!({"priceCents": 2}))
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(h.keys.current(MENU_LIST).await.unwrap(), 1);
}

#[tokio::test]
async fn test_untracked_writes_leave_versions_alone() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv, config(30_000));

    h.store
        .create(
            Collection::Reservation,
            &json!({"restaurantId": "chaikhana", "guests": 4}),
        )
        .await
        .unwrap();
    for (base, version) in h.keys.snapshot().await {
        assert_eq!(version, 0, "{base} should not move");
    }
    assert!(h.layer.last_sync().is_none());
}

#[tokio::test]
async fn test_disabled_cache_matches_enabled_results() {
    let enabled = harness(Arc::new(MemoryStore::new()), config(0));
    let disabled = harness(Arc::new(DisabledStore), config(0));

    for h in [&enabled, &disabled] {
        seed_menu(&h.db).await;
        h.layer.menu.list().await.unwrap();
        h.store
            .update(Collection::MenuItem, "osh", &json!({"name": "Osh Plov"}))
            .await
            .unwrap();
    }

    assert_eq!(
        enabled.layer.menu.list().await.unwrap(),
        disabled.layer.menu.list().await.unwrap()
    );
    assert_eq!(
        enabled.layer.menu_detail.get_by_id("osh").await.unwrap(),
        disabled.layer.menu_detail.get_by_id("osh").await.unwrap()
    );
    assert_eq!(
        enabled.layer.ingredients.list().await.unwrap(),
        disabled.layer.ingredients.list().await.unwrap()
    );
    assert_eq!(
        enabled.layer.ingredients.get_by_id("lamb").await.unwrap(),
        disabled.layer.ingredients.get_by_id("lamb").await.unwrap()
    );
    assert_eq!(
        enabled.layer.restaurants.list().await.unwrap(),
        disabled.layer.restaurants.list().await.unwrap()
    );

    // Every disabled read went to the store
    let fetched = disabled.layer.menu.list_with_source().await.unwrap();
    assert_eq!(fetched.source, Tier::Store);
    let status = disabled.layer.status().await;
    assert!(!status.enabled);
    assert_eq!(status.repositories.iter().map(|s| s.errors).sum::<u64>(), 0);
}

#[tokio::test]
async fn test_unreachable_cache_falls_back_to_store() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv.clone(), config(0));
    seed_menu(&h.db).await;
    kv.set_unreachable(true);

    let fetched = h.layer.menu.list_with_source().await.unwrap();
    assert_eq!(fetched.source, Tier::Store);
    assert_eq!(fetched.value.len(), 3);

    // Writes still succeed even though invalidation cannot run
    h.store
        .update(Collection::MenuItem, "osh", &json!({"name": "Osh Plov"}))
        .await
        .unwrap();
    assert!(h.layer.menu.stats().errors > 0);
}

#[tokio::test]
async fn test_corrupt_entry_is_dropped_and_reloaded() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv.clone(), config(0));
    seed_menu(&h.db).await;

    kv.set("menu:list:v:0", b"not msgpack", Duration::from_secs(60))
        .await
        .unwrap();
    let fetched = h.layer.menu.list_with_source().await.unwrap();
    assert_eq!(fetched.source, Tier::Store);
    assert_eq!(fetched.value.len(), 3);

    let again = h.layer.menu.list_with_source().await.unwrap();
    assert_eq!(again.source, Tier::Distributed);
}

#[tokio::test]
async fn test_transient_store_error_retried_once() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv, config(0));
    seed_menu(&h.db).await;

    h.db.fail_next_read(StorageError::connection("connection reset by peer"));
    let items = h.layer.menu.list().await.unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(h.db.reconnect_count(), 1);

    h.db.fail_next_read(StorageError::invalid_record("bad filter"));
    h.layer.menu.invalidate().await;
    let err = h.layer.menu.list().await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidRecord { .. }));
    assert_eq!(h.db.reconnect_count(), 1);
}

#[tokio::test]
async fn test_concurrent_cold_misses_are_not_deduplicated() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv, config(0));
    seed_menu(&h.db).await;
    h.db.set_read_delay(Duration::from_millis(20));

    let (a, b) = tokio::join!(
        h.layer.ingredients.get_with_source("rice"),
        h.layer.ingredients.get_with_source("rice"),
    );
    assert_eq!(a.unwrap().unwrap().source, Tier::Store);
    assert_eq!(b.unwrap().unwrap().source, Tier::Store);
    assert_eq!(h.db.read_count(), 2);
}

#[tokio::test]
async fn test_status_reports_versions_and_stats() {
    let kv = Arc::new(MemoryStore::new());
    let h = harness(kv, config(30_000));
    seed_menu(&h.db).await;
    h.layer.menu.list().await.unwrap();
    h.layer.menu.list().await.unwrap();
    h.store
        .delete(Collection::Restaurant, "chaikhana")
        .await
        .unwrap();

    let status = h.layer.status().await;
    assert_eq!(status.backend, "memory");
    assert!(status.reachable);
    assert_eq!(status.versions[RESTAURANT_LIST], 1);
    assert!(status.last_sync.is_some());
    let menu = status
        .repositories
        .iter()
        .find(|s| s.cache == MENU_LIST)
        .unwrap();
    assert_eq!((menu.misses, menu.memory_hits), (1, 1));
    assert_eq!(status.repositories.len(), 5);
}

#[tokio::test]
async fn test_layer_debug_names_the_kv_backend() {
    let h = harness(Arc::new(MemoryStore::new()), config(0));
    let rendered = format!("{:?}", h.layer);
    assert!(rendered.contains("CacheDeps"), "{rendered}");
    assert!(rendered.contains(r#"backend: "memory""#), "{rendered}");
}
