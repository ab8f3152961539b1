//! Generic read-through repository.
//!
//! ```text
//! fetch(id) → memory tier → distributed tier (versioned key) → source store
//!                               │
//!                               └─ near expiry? take lock → background refresh
//! ```
//!
//! Only source store errors reach the caller. Every cache tier failure is
//! logged and treated as a miss.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use dastarkhan_storage::StorageError;

use crate::codec::{self, Cacheable};
use crate::error::CacheError;
use crate::keys::VersionedKeys;
use crate::kv::{KeyTtl, SharedKv};
use crate::lock::RefreshLock;
use crate::memory::MemoryTier;
use crate::refresh::RefreshScheduler;
use crate::source::EntitySource;
use crate::stats::{
    CacheStats, RefreshOutcome, StatsSnapshot, Tier, record_cache_error, record_cache_hit,
    record_cache_miss, record_refresh,
};

/// Refresh-ahead settings for a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Refresh once the distributed entry has less than this left.
    pub threshold: Duration,
    /// TTL of the `{base}:refreshing:{id}` lock.
    pub lock_ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySettings {
    pub base: &'static str,
    /// TTL of distributed entries.
    pub ttl: Duration,
    /// TTL of memory entries; zero disables the memory tier.
    pub memory_ttl: Duration,
    pub refresh: Option<RefreshPolicy>,
}

/// Collaborators shared by every repository.
#[derive(Clone)]
pub struct CacheDeps {
    pub kv: SharedKv,
    pub keys: VersionedKeys,
    pub refresher: RefreshScheduler,
}

impl CacheDeps {
    pub fn new(kv: SharedKv, max_concurrent_refreshes: usize) -> Self {
        Self {
            keys: VersionedKeys::new(Arc::clone(&kv)),
            kv,
            refresher: RefreshScheduler::new(max_concurrent_refreshes),
        }
    }
}

impl std::fmt::Debug for CacheDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheDeps")
            .field("backend", &self.kv.backend_name())
            .field("keys", &self.keys)
            .field("refresher", &self.refresher)
            .finish()
    }
}

/// A value together with the tier that served it.
#[derive(Debug, Clone)]
pub struct Fetched<V> {
    pub value: Arc<V>,
    pub source: Tier,
}

struct Inner<V: Cacheable> {
    settings: RepositorySettings,
    deps: CacheDeps,
    memory: MemoryTier<V>,
    source: Arc<dyn EntitySource<V>>,
    stats: CacheStats,
}

impl<V: Cacheable> Inner<V> {
    fn absorb(&self, operation: &'static str, err: &CacheError) {
        warn!(
            cache = self.settings.base,
            operation,
            error = %err,
            "cache error absorbed"
        );
        self.stats.record_error();
        record_cache_error(self.settings.base, operation);
    }

    async fn read_distributed(&self, key: &str) -> Option<V> {
        let bytes = match self.deps.kv.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                self.absorb("get", &e);
                return None;
            }
        };
        match codec::decode::<V>(key, &bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                self.absorb("decode", &e);
                if let Err(e) = self.deps.kv.del(&[key.to_string()]).await {
                    self.absorb("del", &e);
                }
                None
            }
        }
    }

    /// Time left on a distributed entry. `None` when unknown or unbounded.
    async fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        match self.deps.kv.ttl(key).await {
            Ok(KeyTtl::Expires(remaining)) => Some(remaining),
            Ok(_) => None,
            Err(e) => {
                self.absorb("ttl", &e);
                None
            }
        }
    }

    async fn write_distributed(&self, key: &str, value: &V) -> bool {
        let written = match codec::encode(key, value) {
            Ok(bytes) => self.deps.kv.set(key, &bytes, self.settings.ttl).await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => true,
            Err(e) => {
                self.absorb("set", &e);
                false
            }
        }
    }
}

/// Three-tier read-through cache over one [`EntitySource`].
///
/// `id = None` addresses the whole collection (list repositories), `Some`
/// addresses one entity.
pub struct CachedRepository<V: Cacheable> {
    inner: Arc<Inner<V>>,
}

impl<V: Cacheable> Clone for CachedRepository<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Cacheable> CachedRepository<V> {
    pub fn new(
        settings: RepositorySettings,
        deps: CacheDeps,
        source: Arc<dyn EntitySource<V>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                memory: MemoryTier::new(settings.memory_ttl),
                settings,
                deps,
                source,
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn base(&self) -> &'static str {
        self.inner.settings.base
    }

    pub fn settings(&self) -> &RepositorySettings {
        &self.inner.settings
    }

    /// Reads through the tiers. `Ok(None)` (not found) is never cached.
    pub async fn fetch(&self, id: Option<&str>) -> Result<Option<Fetched<V>>, StorageError> {
        let inner = &self.inner;
        let base = inner.settings.base;

        if let Some(value) = inner.memory.get(id) {
            debug!(cache = base, id, "cache hit (memory)");
            inner.stats.record_hit(Tier::Memory);
            record_cache_hit(base, Tier::Memory);
            return Ok(Some(Fetched {
                value,
                source: Tier::Memory,
            }));
        }

        // Without a readable version there is no key to read or write
        let key = match inner.deps.keys.physical(base, id).await {
            Ok(key) => Some(key),
            Err(e) => {
                inner.absorb("version", &e);
                None
            }
        };

        if let Some(key) = key.as_deref()
            && let Some(value) = inner.read_distributed(key).await
        {
            debug!(cache = base, key = %key, "cache hit (distributed)");
            inner.stats.record_hit(Tier::Distributed);
            record_cache_hit(base, Tier::Distributed);

            let value = Arc::new(value);
            // The memory copy must not outlive the entry it came from
            let remaining = inner.remaining_ttl(key).await;
            match remaining {
                Some(remaining) => inner.memory.put_for(id, Arc::clone(&value), remaining),
                None => inner.memory.put(id, Arc::clone(&value)),
            }
            if let (Some(policy), Some(remaining)) = (inner.settings.refresh, remaining) {
                self.maybe_refresh_ahead(key, id, policy, remaining).await;
            }
            return Ok(Some(Fetched {
                value,
                source: Tier::Distributed,
            }));
        }

        debug!(cache = base, id, "cache miss");
        inner.stats.record_hit(Tier::Store);
        record_cache_miss(base);

        let Some(value) = inner.source.load(id).await? else {
            debug!(cache = base, id, "not found in store");
            return Ok(None);
        };
        let value = Arc::new(value);
        if let Some(key) = key.as_deref() {
            inner.write_distributed(key, &value).await;
        }
        inner.memory.put(id, Arc::clone(&value));
        Ok(Some(Fetched {
            value,
            source: Tier::Store,
        }))
    }

    async fn maybe_refresh_ahead(
        &self,
        key: &str,
        id: Option<&str>,
        policy: RefreshPolicy,
        remaining: Duration,
    ) {
        let inner = &self.inner;
        let base = inner.settings.base;

        if remaining >= policy.threshold {
            return;
        }

        let lock_id = id.unwrap_or("all");
        let Some(lock) =
            RefreshLock::acquire(Arc::clone(&inner.deps.kv), base, lock_id, policy.lock_ttl).await
        else {
            inner.stats.record_refresh_skipped();
            record_refresh(base, RefreshOutcome::Skipped);
            return;
        };

        debug!(cache = base, key = %key, ?remaining, "refreshing ahead of expiry");
        let repo = self.clone();
        let owned_id = id.map(str::to_owned);
        let started = inner
            .deps
            .refresher
            .spawn(base, lock, async move {
                repo.refresh(owned_id.as_deref()).await
            })
            .await;
        if started {
            inner.stats.record_refresh_started();
        } else {
            inner.stats.record_refresh_skipped();
        }
    }

    /// Reloads from the store and rewrites the entry.
    ///
    /// The key is resolved before loading, like a cold miss. A write that
    /// bumps the version while the load runs leaves this refresh writing to
    /// an orphaned key instead of the new one.
    async fn refresh(&self, id: Option<&str>) -> RefreshOutcome {
        let inner = &self.inner;
        let base = inner.settings.base;

        let key = match inner.deps.keys.physical(base, id).await {
            Ok(key) => key,
            Err(e) => {
                inner.absorb("version", &e);
                return RefreshOutcome::Failed;
            }
        };
        let value = match inner.source.load(id).await {
            Ok(Some(value)) => value,
            Ok(None) => return RefreshOutcome::Vanished,
            Err(e) => {
                warn!(cache = base, id, error = %e, "background refresh failed");
                return RefreshOutcome::Failed;
            }
        };
        if inner.write_distributed(&key, &value).await {
            debug!(cache = base, key = %key, "refreshed ahead of expiry");
            RefreshOutcome::Refreshed
        } else {
            RefreshOutcome::Failed
        }
    }

    /// Drops cached state for the collection (`None`) or one entity.
    ///
    /// A collection is invalidated by bumping its version; an entity by
    /// deleting its keys under every version. The local memory tier is
    /// cleared as well.
    pub async fn invalidate(&self, id: Option<&str>) {
        let inner = &self.inner;
        let base = inner.settings.base;
        match id {
            None => {
                inner.memory.clear();
                if let Err(e) = inner.deps.keys.bump(base).await {
                    inner.absorb("bump", &e);
                }
            }
            Some(id) => {
                inner.memory.remove(Some(id));
                if let Err(e) = inner.deps.keys.delete_entity(base, id).await {
                    inner.absorb("delete", &e);
                }
            }
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot(self.inner.settings.base)
    }

    /// Entries currently held in the memory tier.
    pub fn memory_entries(&self) -> usize {
        self.inner.memory.len()
    }
}

impl<V: Cacheable> std::fmt::Debug for CachedRepository<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedRepository")
            .field("base", &self.inner.settings.base)
            .field("kind", &V::KIND)
            .finish()
    }
}
