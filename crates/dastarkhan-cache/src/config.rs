//! Cache and Redis configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Redis connection settings.
///
/// Redis is optional: when disabled or unreachable the cache runs in
/// store-only mode through the disabled key-value sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable the distributed tier.
    /// Default: false
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    16
}

fn default_redis_timeout_ms() -> u64 {
    1000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

impl RedisConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(format!("redis.url must be a redis:// URL, got {}", self.url));
        }
        if self.pool_size == 0 {
            return Err("redis.pool_size must be greater than 0".into());
        }
        if self.timeout_ms == 0 {
            return Err("redis.timeout_ms must be greater than 0".into());
        }
        Ok(())
    }
}

/// Cache tier timings.
///
/// All values are milliseconds. The memory tier must expire well before a
/// detail entry enters its refresh window, otherwise a busy node keeps
/// serving from memory and never reads the near-expiry distributed entry.
/// `memory_ttl_ms = 0` disables the memory tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_menu_list_ttl_ms")]
    pub menu_list_ttl_ms: u64,

    #[serde(default = "default_menu_detail_ttl_ms")]
    pub menu_detail_ttl_ms: u64,

    #[serde(default = "default_ingredient_ttl_ms")]
    pub ingredient_ttl_ms: u64,

    #[serde(default = "default_restaurant_list_ttl_ms")]
    pub restaurant_list_ttl_ms: u64,

    /// Process-local memory tier TTL, capped at each collection's TTL
    #[serde(default = "default_memory_ttl_ms")]
    pub memory_ttl_ms: u64,

    /// Remaining TTL below which a detail read triggers a background refresh
    #[serde(default = "default_refresh_ahead_ms")]
    pub refresh_ahead_ms: u64,

    /// Lifetime of the refresh lock, bounding recovery from a stuck refresh
    #[serde(default = "default_refresh_lock_ttl_ms")]
    pub refresh_lock_ttl_ms: u64,

    /// Upper bound on concurrently running background refreshes
    #[serde(default = "default_max_concurrent_refreshes")]
    pub max_concurrent_refreshes: usize,

    /// Pause between reconnecting the source store and retrying a call
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_menu_list_ttl_ms() -> u64 {
    5 * 60 * 1000
}

fn default_menu_detail_ttl_ms() -> u64 {
    5 * 60 * 1000
}

fn default_ingredient_ttl_ms() -> u64 {
    10 * 60 * 1000
}

fn default_restaurant_list_ttl_ms() -> u64 {
    10 * 60 * 1000
}

fn default_memory_ttl_ms() -> u64 {
    30_000
}

fn default_refresh_ahead_ms() -> u64 {
    2 * 60 * 1000
}

fn default_refresh_lock_ttl_ms() -> u64 {
    10_000
}

fn default_max_concurrent_refreshes() -> usize {
    8
}

fn default_retry_backoff_ms() -> u64 {
    100
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            menu_list_ttl_ms: default_menu_list_ttl_ms(),
            menu_detail_ttl_ms: default_menu_detail_ttl_ms(),
            ingredient_ttl_ms: default_ingredient_ttl_ms(),
            restaurant_list_ttl_ms: default_restaurant_list_ttl_ms(),
            memory_ttl_ms: default_memory_ttl_ms(),
            refresh_ahead_ms: default_refresh_ahead_ms(),
            refresh_lock_ttl_ms: default_refresh_lock_ttl_ms(),
            max_concurrent_refreshes: default_max_concurrent_refreshes(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        let ttls = [
            ("cache.menu_list_ttl_ms", self.menu_list_ttl_ms),
            ("cache.menu_detail_ttl_ms", self.menu_detail_ttl_ms),
            ("cache.ingredient_ttl_ms", self.ingredient_ttl_ms),
            ("cache.restaurant_list_ttl_ms", self.restaurant_list_ttl_ms),
        ];
        for (name, ttl) in ttls {
            if ttl == 0 {
                return Err(format!("{name} must be greater than 0"));
            }
        }

        // Detail reads are the ones that refresh ahead
        for (name, ttl) in [ttls[1], ttls[2]] {
            if self.refresh_ahead_ms >= ttl {
                return Err(format!(
                    "cache.refresh_ahead_ms ({}) must be below {name} ({ttl})",
                    self.refresh_ahead_ms
                ));
            }
            let window_start = ttl - self.refresh_ahead_ms;
            if self.memory_ttl_ms >= window_start {
                return Err(format!(
                    "cache.memory_ttl_ms ({}) must be below {name} minus \
                     cache.refresh_ahead_ms ({window_start})",
                    self.memory_ttl_ms
                ));
            }
        }

        if self.refresh_lock_ttl_ms == 0 {
            return Err("cache.refresh_lock_ttl_ms must be greater than 0".into());
        }
        if self.max_concurrent_refreshes == 0 {
            return Err("cache.max_concurrent_refreshes must be greater than 0".into());
        }
        Ok(())
    }

    /// Memory tier TTL for a collection with the given distributed TTL.
    pub fn memory_ttl(&self, collection_ttl_ms: u64) -> Duration {
        Duration::from_millis(self.memory_ttl_ms.min(collection_ttl_ms))
    }

    pub fn refresh_ahead(&self) -> Duration {
        Duration::from_millis(self.refresh_ahead_ms)
    }

    pub fn refresh_lock_ttl(&self) -> Duration {
        Duration::from_millis(self.refresh_lock_ttl_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
