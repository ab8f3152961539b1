//! Per-repository counters and the `metrics` facade.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Metric names
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_REFRESHES_TOTAL: &str = "cache_refreshes_total";
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "cache_invalidations_total";
    pub const CACHE_ERRORS_TOTAL: &str = "cache_errors_total";
}

/// Where a value was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Memory,
    Distributed,
    Store,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Distributed => "distributed",
            Self::Store => "store",
        }
    }
}

/// Outcome of a refresh-ahead attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    /// The entity disappeared from the store; nothing was rewritten.
    Vanished,
    Failed,
    Panicked,
    /// Lock held elsewhere, or no worker permit.
    Skipped,
}

impl RefreshOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refreshed => "refreshed",
            Self::Vanished => "vanished",
            Self::Failed => "failed",
            Self::Panicked => "panicked",
            Self::Skipped => "skipped",
        }
    }
}

pub fn record_cache_hit(cache: &'static str, tier: Tier) {
    metrics::counter!(names::CACHE_HITS_TOTAL, "cache" => cache, "tier" => tier.as_str())
        .increment(1);
}

pub fn record_cache_miss(cache: &'static str) {
    metrics::counter!(names::CACHE_MISSES_TOTAL, "cache" => cache).increment(1);
}

pub fn record_refresh(cache: &'static str, outcome: RefreshOutcome) {
    metrics::counter!(
        names::CACHE_REFRESHES_TOTAL,
        "cache" => cache,
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_invalidation(collection: &'static str) {
    metrics::counter!(names::CACHE_INVALIDATIONS_TOTAL, "collection" => collection).increment(1);
}

pub fn record_cache_error(cache: &'static str, operation: &'static str) {
    metrics::counter!(names::CACHE_ERRORS_TOTAL, "cache" => cache, "operation" => operation)
        .increment(1);
}

/// Counters for one repository.
#[derive(Debug, Default)]
pub struct CacheStats {
    memory_hits: AtomicU64,
    distributed_hits: AtomicU64,
    misses: AtomicU64,
    refreshes_started: AtomicU64,
    refreshes_skipped: AtomicU64,
    errors: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self, tier: Tier) {
        match tier {
            Tier::Memory => self.memory_hits.fetch_add(1, Ordering::Relaxed),
            Tier::Distributed => self.distributed_hits.fetch_add(1, Ordering::Relaxed),
            Tier::Store => self.misses.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_refresh_started(&self) {
        self.refreshes_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_skipped(&self) {
        self.refreshes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, cache: &'static str) -> StatsSnapshot {
        StatsSnapshot {
            cache,
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            distributed_hits: self.distributed_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            refreshes_started: self.refreshes_started.load(Ordering::Relaxed),
            refreshes_skipped: self.refreshes_skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cache: &'static str,
    pub memory_hits: u64,
    pub distributed_hits: u64,
    pub misses: u64,
    pub refreshes_started: u64,
    pub refreshes_skipped: u64,
    pub errors: u64,
}
