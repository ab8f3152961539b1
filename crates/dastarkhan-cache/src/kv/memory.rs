use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::{KeyTtl, KeyValueStore, glob_match};
use crate::error::{CacheError, CacheResult};

#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process key-value store with Redis expiry semantics.
///
/// Expiry follows `tokio::time`, so tests can age entries with a paused
/// clock. Every call is counted, and the store can be switched into an
/// "unreachable" mode in which every call fails with `Unavailable`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Slot>,
    calls: AtomicUsize,
    unreachable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trait calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    /// Makes every subsequent call fail as if Redis went away.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Rewrites the expiry of a key so it expires `remaining` from now.
    /// Returns `false` if the key does not exist.
    pub fn expire_in(&self, key: &str, remaining: Duration) -> bool {
        match self.entries.get_mut(key) {
            Some(mut slot) => {
                slot.expires_at = Some(Instant::now() + remaining);
                true
            }
            None => false,
        }
    }

    /// Reads a live value without counting a call.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.clone())
    }

    /// Live keys matching a glob pattern, without counting a call.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_live(now) && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    fn enter(&self) -> CacheResult<Instant> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("memory store marked unreachable"));
        }
        Ok(Instant::now())
    }

    fn live(&self, key: &str, now: Instant) -> Option<Slot> {
        let slot = self.entries.get(key).map(|s| s.clone())?;
        if slot.is_live(now) {
            Some(slot)
        } else {
            self.entries.remove_if(key, |_, s| !s.is_live(now));
            None
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = self.enter()?;
        Ok(self.live(key, now).map(|slot| slot.value))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let now = self.enter()?;
        self.entries.insert(
            key.to_string(),
            Slot {
                value: value.to_vec(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> CacheResult<u64> {
        let now = self.enter()?;
        let mut removed = 0;
        for key in keys {
            if let Some((_, slot)) = self.entries.remove(key)
                && slot.is_live(now)
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn scan(&self, pattern: &str) -> CacheResult<Vec<String>> {
        self.enter()?;
        Ok(self.keys(pattern))
    }

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        let now = self.enter()?;
        Ok(match self.live(key, now) {
            None => KeyTtl::Missing,
            Some(Slot {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Slot {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expires(at.saturating_duration_since(now)),
        })
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        let now = self.enter()?;
        let mut slot = self.entries.entry(key.to_string()).or_insert(Slot {
            value: b"0".to_vec(),
            expires_at: None,
        });
        if !slot.is_live(now) {
            *slot = Slot {
                value: b"0".to_vec(),
                expires_at: None,
            };
        }
        let current: i64 = std::str::from_utf8(&slot.value)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CacheError::write(key, "value is not an integer"))?;
        let next = current + 1;
        slot.value = next.to_string().into_bytes();
        Ok(next)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        let now = self.enter()?;
        let fresh = Slot {
            value: value.to_vec(),
            expires_at: ttl.map(|ttl| now + ttl),
        };
        let inserted = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_live(now) {
                    false
                } else {
                    entry.insert(fresh);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(fresh);
                true
            }
        };
        Ok(inserted)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> bool {
        !self.unreachable.load(Ordering::SeqCst)
    }
}
