use std::time::Duration;

use async_trait::async_trait;

use super::{KeyTtl, KeyValueStore};
use crate::error::CacheResult;

/// The "no distributed cache configured" sentinel.
///
/// Reads miss, writes are dropped, the lock is never granted. Nothing fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledStore;

#[async_trait]
impl KeyValueStore for DisabledStore {
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> CacheResult<()> {
        Ok(())
    }

    async fn del(&self, _keys: &[String]) -> CacheResult<u64> {
        Ok(0)
    }

    async fn scan(&self, _pattern: &str) -> CacheResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn ttl(&self, _key: &str) -> CacheResult<KeyTtl> {
        Ok(KeyTtl::Missing)
    }

    async fn incr(&self, _key: &str) -> CacheResult<i64> {
        Ok(0)
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: &[u8],
        _ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        Ok(false)
    }

    fn backend_name(&self) -> &'static str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
