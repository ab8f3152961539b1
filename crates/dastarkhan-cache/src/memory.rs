//! Process-local memory tier.
//!
//! Entries are `(Arc<V>, expires_at)` pairs replaced atomically; readers
//! never observe a half-written value. Writes from other processes do not
//! reach this tier, so an entry may be stale for up to its TTL.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use tokio::time::Instant;

struct MemoryEntry<V> {
    value: Arc<V>,
    expires_at: Instant,
}

impl<V> MemoryEntry<V> {
    fn new(value: Arc<V>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn fresh(&self) -> Option<Arc<V>> {
        (!self.is_expired()).then(|| Arc::clone(&self.value))
    }
}

/// A single slot (collection lists) plus a map of per-entity slots.
pub struct MemoryTier<V> {
    ttl: Duration,
    slot: ArcSwapOption<MemoryEntry<V>>,
    entries: DashMap<String, MemoryEntry<V>>,
}

impl<V: Send + Sync> MemoryTier<V> {
    /// A zero `ttl` disables the tier.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: ArcSwapOption::empty(),
            entries: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn get(&self, id: Option<&str>) -> Option<Arc<V>> {
        if !self.is_enabled() {
            return None;
        }
        match id {
            None => self.slot.load().as_ref().and_then(|e| e.fresh()),
            Some(id) => {
                let fresh = self.entries.get(id).and_then(|e| e.fresh());
                if fresh.is_none() {
                    self.entries.remove_if(id, |_, e| e.is_expired());
                }
                fresh
            }
        }
    }

    pub fn put(&self, id: Option<&str>, value: Arc<V>) {
        self.put_for(id, value, self.ttl);
    }

    /// Stores `value` for at most `limit`, never longer than the tier TTL.
    ///
    /// Used for values copied from an entry that itself expires sooner.
    pub fn put_for(&self, id: Option<&str>, value: Arc<V>, limit: Duration) {
        let ttl = self.ttl.min(limit);
        if ttl.is_zero() {
            return;
        }
        match id {
            None => self.slot.store(Some(Arc::new(MemoryEntry::new(value, ttl)))),
            Some(id) => {
                self.entries
                    .insert(id.to_string(), MemoryEntry::new(value, ttl));
            }
        }
    }

    pub fn remove(&self, id: Option<&str>) {
        match id {
            None => self.slot.store(None),
            Some(id) => {
                self.entries.remove(id);
            }
        }
    }

    pub fn clear(&self) {
        self.slot.store(None);
        self.entries.clear();
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.len() + usize::from(self.slot.load().is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
