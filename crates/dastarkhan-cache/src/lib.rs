//! Read-through, write-invalidate caching for the Dastarkhan menu.
//!
//! ## Architecture
//!
//! ```text
//! list()/get_by_id() → memory tier → distributed tier → source store
//!                       (process)     (Redis, versioned)  (Postgres)
//!
//! create/update/... → ObservedStore → store → CacheInvalidator → bump versions
//! ```
//!
//! - Distributed keys embed a per-collection version counter, so a write
//!   invalidates by incrementing the counter instead of deleting keys.
//! - Detail reads close to expiry are refreshed in the background, guarded
//!   by a `set_if_absent` lock so only one process refreshes an entry.
//! - When Redis is not configured the [`DisabledStore`] sentinel turns every
//!   cache call into a no-op and reads go straight to the store.
//!
//! ## Graceful Degradation
//!
//! Cache failures never surface to callers: they are logged, counted, and
//! treated as misses. Only source store errors propagate.

pub mod codec;
pub mod config;
pub mod entity;
pub mod error;
pub mod invalidation;
pub mod keys;
pub mod kv;
pub mod layer;
pub mod lock;
pub mod memory;
pub mod refresh;
pub mod repos;
pub mod repository;
pub mod source;
pub mod stats;

pub use codec::Cacheable;
pub use config::{CacheConfig, RedisConfig};
pub use entity::{Ingredient, MenuDetail, MenuItem, Restaurant};
pub use error::{CacheError, CacheResult};
pub use invalidation::{CacheInvalidator, InvalidationPlan, LastSyncMarker, bumps_for};
pub use keys::VersionedKeys;
pub use kv::{
    DisabledStore, KeyTtl, KeyValueStore, MemoryStore, RedisStore, SharedKv, create_kv_store,
};
pub use layer::{CacheLayer, CacheStatus};
pub use lock::RefreshLock;
pub use refresh::RefreshScheduler;
pub use repos::{IngredientListCache, MenuDetailCache, MenuListCache, RestaurantListCache};
pub use repository::{CacheDeps, CachedRepository, Fetched, RefreshPolicy, RepositorySettings};
pub use source::EntitySource;
pub use stats::{RefreshOutcome, StatsSnapshot, Tier};
