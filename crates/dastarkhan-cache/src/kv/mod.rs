//! Key-value adapter over the distributed cache.
//!
//! Three implementations share the [`KeyValueStore`] contract:
//!
//! - [`RedisStore`]: the real distributed tier (deadpool-redis pool)
//! - [`DisabledStore`]: the sentinel used when no Redis is configured; every
//!   call is a successful no-op, so callers never have to check for it
//! - [`MemoryStore`]: an in-process store with Redis semantics, used by tests
//!   and single-node setups

mod disabled;
mod memory;
mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use disabled::DisabledStore;
pub use memory::MemoryStore;
pub use redis::RedisStore;

use crate::config::RedisConfig;
use crate::error::CacheResult;

/// Remaining lifetime of a key, as reported by `PTTL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists without an expiry.
    Persistent,
    /// The key expires after this long.
    Expires(Duration),
}

impl KeyTtl {
    /// Maps a raw `PTTL` reply (-2 missing, -1 persistent) to a `KeyTtl`.
    pub fn from_pttl(millis: i64) -> Self {
        match millis {
            -2 => Self::Missing,
            m if m < 0 => Self::Persistent,
            m => Self::Expires(Duration::from_millis(m.unsigned_abs())),
        }
    }
}

/// Contract of the distributed cache.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Stores a value that expires after `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Deletes keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> CacheResult<u64>;

    /// Returns all keys matching a glob pattern, iterating with a cursor.
    async fn scan(&self, pattern: &str) -> CacheResult<Vec<String>>;

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl>;

    /// Atomically increments an integer key (absent counts as 0).
    async fn incr(&self, key: &str) -> CacheResult<i64>;

    /// Sets `key` only if it does not exist. Returns `true` if it was set.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> CacheResult<bool>;

    /// Short backend name for logs and the status endpoint.
    fn backend_name(&self) -> &'static str;

    /// Returns `false` only for the disabled sentinel.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Checks that the backend answers (for health checks).
    async fn ping(&self) -> bool {
        self.is_enabled()
    }
}

/// Shared handle to the key-value store.
pub type SharedKv = Arc<dyn KeyValueStore>;

/// Builds the distributed tier from configuration.
///
/// Falls back to the [`DisabledStore`] sentinel if Redis is disabled, the
/// pool cannot be built or the first connection fails.
pub async fn create_kv_store(config: &RedisConfig) -> SharedKv {
    if !config.enabled {
        tracing::info!("Redis disabled, running with store-only reads");
        return Arc::new(DisabledStore);
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let timeout = Some(Duration::from_millis(config.timeout_ms));
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts = deadpool_redis::Timeouts {
        wait: timeout,
        create: timeout,
        recycle: timeout,
    };
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create Redis pool, cache disabled");
            return Arc::new(DisabledStore);
        }
    };

    match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis");
            Arc::new(RedisStore::new(pool))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to connect to Redis, cache disabled");
            Arc::new(DisabledStore)
        }
    }
}

/// Redis-style glob matching supporting `*`, `?` and backslash escapes.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();
    let (mut p, mut k) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while k < key.len() {
        let step = match pattern.get(p).copied() {
            Some('*') => {
                star = Some((p, k));
                p += 1;
                continue;
            }
            Some('\\') if p + 1 < pattern.len() => (pattern[p + 1] == key[k]).then_some(2),
            Some('?') => Some(1),
            Some(c) => (c == key[k]).then_some(1),
            None => None,
        };
        if let Some(step) = step {
            p += step;
            k += 1;
        } else if let Some((star_p, star_k)) = star {
            p = star_p + 1;
            k = star_k + 1;
            star = Some((star_p, star_k + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("menu:detail:v:*:id:osh", "menu:detail:v:3:id:osh"));
        assert!(glob_match("menu:detail:v:*:id:osh", "menu:detail:v:12:id:osh"));
        assert!(!glob_match("menu:detail:v:*:id:osh", "menu:detail:v:3:id:osh-2"));
        assert!(glob_match("menu:list:v:*", "menu:list:v:0"));
        assert!(!glob_match("menu:list:v:*", "menu:list:version"));
        assert!(glob_match("menu:list:v:?", "menu:list:v:7"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn test_glob_match_honors_escapes() {
        assert!(glob_match(r"menu:detail:v:*:id:os\*", "menu:detail:v:0:id:os*"));
        assert!(!glob_match(r"menu:detail:v:*:id:os\*", "menu:detail:v:0:id:osh"));
        assert!(glob_match(r"a\?b", "a?b"));
        assert!(!glob_match(r"a\?b", "axb"));
        assert!(glob_match(r"a\\b", r"a\b"));
    }

    #[test]
    fn test_pttl_mapping() {
        assert_eq!(KeyTtl::from_pttl(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_pttl(-1), KeyTtl::Persistent);
        assert_eq!(
            KeyTtl::from_pttl(1500),
            KeyTtl::Expires(Duration::from_millis(1500))
        );
    }

    #[tokio::test]
    async fn test_disabled_config_yields_sentinel() {
        let kv = create_kv_store(&RedisConfig::default()).await;
        assert!(!kv.is_enabled());
        assert_eq!(kv.backend_name(), "disabled");
    }
}
