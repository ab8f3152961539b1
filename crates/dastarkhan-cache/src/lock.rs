//! Stampede lock for background refreshes.

use std::time::Duration;

use tracing::{debug, warn};

use crate::keys::refresh_lock_key;
use crate::kv::SharedKv;

/// A held `{base}:refreshing:{id}` marker.
///
/// Acquired with `set_if_absent` and a short TTL; the TTL frees the lock if
/// the holder dies before calling [`RefreshLock::release`].
pub struct RefreshLock {
    kv: SharedKv,
    key: String,
}

impl RefreshLock {
    /// Tries to take the lock. `None` means someone else holds it, or the
    /// cache could not be asked; both mean "do not refresh".
    pub async fn acquire(kv: SharedKv, base: &str, id: &str, ttl: Duration) -> Option<Self> {
        let key = refresh_lock_key(base, id);
        match kv.set_if_absent(&key, b"1", Some(ttl)).await {
            Ok(true) => {
                debug!(key = %key, "refresh lock acquired");
                Some(Self { kv, key })
            }
            Ok(false) => {
                debug!(key = %key, "refresh lock busy");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "refresh lock unavailable");
                None
            }
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn release(self) {
        match self.kv.del(std::slice::from_ref(&self.key)).await {
            Ok(_) => debug!(key = %self.key, "refresh lock released"),
            Err(e) => warn!(key = %self.key, error = %e, "failed to release refresh lock"),
        }
    }
}

impl std::fmt::Debug for RefreshLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshLock").field("key", &self.key).finish()
    }
}
