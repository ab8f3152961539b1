//! Versioned cache keys.
//!
//! Each cacheable collection (a *base key* such as `menu:list`) has a
//! counter at `{base}:version`. Physical keys embed the counter:
//!
//! ```text
//! menu:list:v:4            whole-collection entry
//! menu:detail:v:7:id:osh   per-entity entry
//! ```
//!
//! Invalidating a collection increments its counter. Entries written under
//! an older version are never looked up again and expire through their TTL.

use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};
use crate::kv::SharedKv;

pub const MENU_LIST: &str = "menu:list";
pub const MENU_DETAIL: &str = "menu:detail";
pub const INGREDIENT_LIST: &str = "ingredient:list";
pub const INGREDIENT_DETAIL: &str = "ingredient:detail";
pub const RESTAURANT_LIST: &str = "restaurant:list";

/// Every base key, for status reporting.
pub const ALL_BASES: [&str; 5] = [
    MENU_LIST,
    MENU_DETAIL,
    INGREDIENT_LIST,
    INGREDIENT_DETAIL,
    RESTAURANT_LIST,
];

/// `{base}:version`
pub fn version_key(base: &str) -> String {
    format!("{base}:version")
}

/// `{base}:v:{version}[:id:{id}]`
pub fn physical_key(base: &str, version: u64, id: Option<&str>) -> String {
    match id {
        Some(id) => format!("{base}:v:{version}:id:{id}"),
        None => format!("{base}:v:{version}"),
    }
}

/// `{base}:refreshing:{id}`
pub fn refresh_lock_key(base: &str, id: &str) -> String {
    format!("{base}:refreshing:{id}")
}

/// Extracts the version from a physical key of `base`.
fn parse_version(base: &str, key: &str) -> Option<u64> {
    let rest = key.strip_prefix(base)?.strip_prefix(":v:")?;
    let version = rest.split(':').next()?;
    version.parse().ok()
}

fn parse_counter(key: &str, raw: &[u8]) -> CacheResult<u64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| CacheError::read(key, "version counter is not a non-negative integer"))
}

/// Reads and bumps version counters in the distributed tier.
#[derive(Clone)]
pub struct VersionedKeys {
    kv: SharedKv,
}

impl VersionedKeys {
    pub fn new(kv: SharedKv) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &SharedKv {
        &self.kv
    }

    /// Returns the current version of `base`, creating the counter at 0.
    pub async fn current(&self, base: &str) -> CacheResult<u64> {
        let key = version_key(base);
        if let Some(raw) = self.kv.get(&key).await? {
            return parse_counter(&key, &raw);
        }
        if self.kv.set_if_absent(&key, b"0", None).await? {
            return Ok(0);
        }
        // Lost the race to another creator (or the cache is disabled)
        match self.kv.get(&key).await? {
            Some(raw) => parse_counter(&key, &raw),
            None => Ok(0),
        }
    }

    /// Physical key for `base` (and `id`) under the current version.
    pub async fn physical(&self, base: &str, id: Option<&str>) -> CacheResult<String> {
        let version = self.current(base).await?;
        Ok(physical_key(base, version, id))
    }

    /// Invalidates a whole collection. Returns the new version.
    pub async fn bump(&self, base: &str) -> CacheResult<u64> {
        let key = version_key(base);
        let next = self.kv.incr(&key).await?;
        let next = u64::try_from(next)
            .map_err(|_| CacheError::write(&key, "version counter went negative"))?;
        debug!(base, version = next, "cache version bumped");
        Ok(next)
    }

    /// Deletes the entries of one entity under every version.
    pub async fn delete_entity(&self, base: &str, id: &str) -> CacheResult<u64> {
        let pattern = format!("{base}:v:*:id:{}", escape_glob(id));
        let keys = self.kv.scan(&pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = self.kv.del(&keys).await?;
        debug!(base, id, removed, "cache entity entries deleted");
        Ok(removed)
    }

    /// Deletes entries written under versions older than the current one.
    ///
    /// Orphaned entries expire on their own; this only reclaims memory
    /// earlier. It is never called on the read path.
    pub async fn purge_stale(&self, base: &str) -> CacheResult<u64> {
        let current = self.current(base).await?;
        let keys = self.kv.scan(&format!("{base}:v:*")).await?;
        let stale: Vec<String> = keys
            .into_iter()
            .filter(|key| parse_version(base, key).is_some_and(|v| v < current))
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        let removed = self.kv.del(&stale).await?;
        if removed > 0 {
            debug!(base, current, removed, "purged stale cache versions");
        }
        Ok(removed)
    }

    /// Current versions of every base key, skipping unreadable counters.
    pub async fn snapshot(&self) -> Vec<(&'static str, u64)> {
        let mut versions = Vec::with_capacity(ALL_BASES.len());
        for base in ALL_BASES {
            match self.current(base).await {
                Ok(version) => versions.push((base, version)),
                Err(e) => warn!(base, error = %e, "failed to read cache version"),
            }
        }
        versions
    }
}

/// Escapes the characters SCAN treats as glob syntax.
pub fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl std::fmt::Debug for VersionedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedKeys")
            .field("backend", &self.kv.backend_name())
            .finish()
    }
}
