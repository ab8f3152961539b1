//! Write-path invalidation.
//!
//! [`CacheInvalidator`] is plugged into an
//! [`ObservedStore`](dastarkhan_storage::ObservedStore) and sees every
//! successful write. The mapping from mutated collection to cache actions
//! is the static table in [`bumps_for`].

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use futures_util::future::join_all;
use time::OffsetDateTime;
use tracing::{debug, warn};

use dastarkhan_storage::{Collection, Mutation, MutationObserver};

use crate::keys::{
    INGREDIENT_DETAIL, INGREDIENT_LIST, MENU_DETAIL, MENU_LIST, RESTAURANT_LIST, VersionedKeys,
};
use crate::stats::record_invalidation;

/// The invalidation table: version counters bumped after a write.
///
/// Writes only ever bump. Deleting an entity's keys instead would race
/// with a read that resolved its key and loaded the old row before the
/// write, and then stores that row again at an unchanged version.
pub const fn bumps_for(collection: Collection) -> &'static [&'static str] {
    match collection {
        Collection::MenuItem => &[MENU_LIST, MENU_DETAIL],
        Collection::Ingredient => &[INGREDIENT_LIST, INGREDIENT_DETAIL, MENU_DETAIL],
        Collection::Restaurant => &[RESTAURANT_LIST],
        // Restaurant and menu lists can both be built from these links
        Collection::MenuItemOnRestaurant => &[RESTAURANT_LIST, MENU_LIST, MENU_DETAIL],
        Collection::MenuItemIngredient => &[MENU_DETAIL],
        Collection::Order | Collection::Reservation => &[],
    }
}

/// Deduplicated work for a batch of mutations.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub bumps: BTreeSet<&'static str>,
}

impl InvalidationPlan {
    /// Each base key is bumped at most once per batch.
    pub fn for_mutations(mutations: &[Mutation]) -> Self {
        let bumps = mutations
            .iter()
            .flat_map(|m| bumps_for(m.collection).iter().copied())
            .collect();
        Self { bumps }
    }

    pub fn is_empty(&self) -> bool {
        self.bumps.is_empty()
    }
}

/// When caches were last invalidated after a write. Diagnostic only.
#[derive(Debug, Default)]
pub struct LastSyncMarker {
    at: ArcSwapOption<OffsetDateTime>,
}

impl LastSyncMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) {
        self.at.store(Some(Arc::new(OffsetDateTime::now_utc())));
    }

    pub fn get(&self) -> Option<OffsetDateTime> {
        self.at.load().as_deref().copied()
    }
}

/// Applies the invalidation table to writes observed on the source store.
///
/// Runs inline after the write succeeded. Failures are logged and never
/// reach the writer.
pub struct CacheInvalidator {
    keys: VersionedKeys,
    last_sync: Arc<LastSyncMarker>,
}

impl CacheInvalidator {
    pub fn new(keys: VersionedKeys, last_sync: Arc<LastSyncMarker>) -> Self {
        Self { keys, last_sync }
    }

    pub fn last_sync(&self) -> &Arc<LastSyncMarker> {
        &self.last_sync
    }

    /// Applies the plan for `mutations`. Returns how many actions succeeded.
    pub async fn apply(&self, mutations: &[Mutation]) -> usize {
        let plan = InvalidationPlan::for_mutations(mutations);
        if plan.is_empty() {
            return 0;
        }

        // Bumps touch distinct counters, so they can run side by side
        let bumps = plan.bumps.iter().map(|base| async move {
            self.keys
                .bump(base)
                .await
                .inspect_err(|e| warn!(base, error = %e, "cache invalidation failed"))
                .is_ok()
        });
        let applied = join_all(bumps).await.into_iter().filter(|ok| *ok).count();

        let collections: HashSet<Collection> = mutations
            .iter()
            .filter(|m| !bumps_for(m.collection).is_empty())
            .map(|m| m.collection)
            .collect();
        for collection in &collections {
            record_invalidation(collection.as_str());
        }

        if applied > 0 {
            self.last_sync.record();
        }
        debug!(
            bumps = plan.bumps.len(),
            applied,
            "caches invalidated after write"
        );
        applied
    }
}

#[async_trait]
impl MutationObserver for CacheInvalidator {
    async fn on_mutations(&self, mutations: &[Mutation]) {
        self.apply(mutations).await;
    }
}

impl std::fmt::Debug for CacheInvalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInvalidator")
            .field("last_sync", &self.last_sync.get())
            .finish()
    }
}
