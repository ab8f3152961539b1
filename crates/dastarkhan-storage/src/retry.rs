//! RetryingStore - one reconnect-and-retry for stale pooled connections.
//!
//! Pooled connections to the source store can go stale across idle periods.
//! When a call fails with a transient error (see
//! [`StorageError::is_transient`]), this wrapper rebuilds the connection,
//! sleeps a fixed backoff and retries the call exactly once. Any other
//! error, or a second failure, reaches the caller unchanged.
//!
//! Writes inside a [`Transaction`] are never retried; only opening the
//! transaction is.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::traits::{Reconnect, SourceStore, Transaction};
use crate::types::{Collection, FindMany, StoredRecord};

/// Default pause between the reconnect and the retry.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// A store wrapper that retries a transient failure once after reconnecting.
pub struct RetryingStore<S> {
    inner: S,
    backoff: Duration,
}

impl<S: SourceStore + Reconnect> RetryingStore<S> {
    /// Wrap a store with the default backoff.
    pub fn new(inner: S) -> Self {
        Self::with_backoff(inner, DEFAULT_RETRY_BACKOFF)
    }

    /// Wrap a store with a custom backoff.
    pub fn with_backoff(inner: S, backoff: Duration) -> Self {
        Self { inner, backoff }
    }

    /// Get a reference to the inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, StorageError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, StorageError>> + Send,
        T: Send,
    {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => err,
            Err(err) => return Err(err),
        };

        warn!(
            operation,
            backend = self.inner.backend_name(),
            error = %err,
            "Transient store failure, reconnecting before a single retry"
        );
        metrics::counter!("store_retries_total", "operation" => operation).increment(1);

        if let Err(reconnect_err) = self.inner.reconnect().await {
            warn!(operation, error = %reconnect_err, "Store reconnect failed");
            return Err(err);
        }
        tokio::time::sleep(self.backoff).await;

        let result = call().await;
        if result.is_ok() {
            debug!(operation, "Store call succeeded after reconnect");
        }
        result
    }
}

#[async_trait]
impl<S: SourceStore + Reconnect> SourceStore for RetryingStore<S> {
    async fn find_many(
        &self,
        collection: Collection,
        query: &FindMany,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        self.with_retry("find_many", move || self.inner.find_many(collection, query))
            .await
    }

    async fn find_unique(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<StoredRecord>, StorageError> {
        self.with_retry("find_unique", move || self.inner.find_unique(collection, id))
            .await
    }

    async fn create(
        &self,
        collection: Collection,
        data: &Value,
    ) -> Result<StoredRecord, StorageError> {
        self.with_retry("create", move || self.inner.create(collection, data))
            .await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: &Value,
    ) -> Result<StoredRecord, StorageError> {
        self.with_retry("update", move || self.inner.update(collection, id, patch))
            .await
    }

    async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        data: &Value,
    ) -> Result<StoredRecord, StorageError> {
        self.with_retry("upsert", move || self.inner.upsert(collection, id, data))
            .await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StorageError> {
        self.with_retry("delete", move || self.inner.delete(collection, id))
            .await
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError> {
        self.with_retry("begin_transaction", move || self.inner.begin_transaction())
            .await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

#[async_trait]
impl<S: SourceStore + Reconnect> Reconnect for RetryingStore<S> {
    async fn reconnect(&self) -> Result<(), StorageError> {
        self.inner.reconnect().await
    }
}

impl<S: SourceStore> std::fmt::Debug for RetryingStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingStore")
            .field("backend", &self.inner.backend_name())
            .field("backoff", &self.backoff)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A store whose `find_unique` replays scripted results.
    struct ScriptedStore {
        script: Mutex<VecDeque<Result<Option<StoredRecord>, StorageError>>>,
        calls: AtomicUsize,
        reconnects: AtomicUsize,
        reconnect_fails: bool,
    }

    impl ScriptedStore {
        fn new(script: Vec<Result<Option<StoredRecord>, StorageError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                reconnects: AtomicUsize::new(0),
                reconnect_fails: false,
            }
        }

        fn unsupported() -> StorageError {
            StorageError::internal("not scripted")
        }
    }

    #[async_trait]
    impl SourceStore for ScriptedStore {
        async fn find_many(
            &self,
            _collection: Collection,
            _query: &FindMany,
        ) -> Result<Vec<StoredRecord>, StorageError> {
            Err(Self::unsupported())
        }

        async fn find_unique(
            &self,
            _collection: Collection,
            _id: &str,
        ) -> Result<Option<StoredRecord>, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(None))
        }

        async fn create(
            &self,
            _collection: Collection,
            _data: &Value,
        ) -> Result<StoredRecord, StorageError> {
            Err(Self::unsupported())
        }

        async fn update(
            &self,
            _collection: Collection,
            _id: &str,
            _patch: &Value,
        ) -> Result<StoredRecord, StorageError> {
            Err(Self::unsupported())
        }

        async fn upsert(
            &self,
            _collection: Collection,
            _id: &str,
            _data: &Value,
        ) -> Result<StoredRecord, StorageError> {
            Err(Self::unsupported())
        }

        async fn delete(&self, _collection: Collection, _id: &str) -> Result<(), StorageError> {
            Err(Self::unsupported())
        }

        async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError> {
            Err(Self::unsupported())
        }

        fn backend_name(&self) -> &'static str {
            "scripted"
        }
    }

    #[async_trait]
    impl Reconnect for ScriptedStore {
        async fn reconnect(&self) -> Result<(), StorageError> {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            if self.reconnect_fails {
                Err(StorageError::connection("refused"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_retried_once() {
        let store = RetryingStore::new(ScriptedStore::new(vec![
            Err(StorageError::connection("connection reset by peer")),
            Ok(None),
        ]));

        let result = store.find_unique(Collection::MenuItem, "osh").await;
        assert!(matches!(result, Ok(None)));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.inner().reconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_transient_failure_propagates() {
        let store = RetryingStore::new(ScriptedStore::new(vec![
            Err(StorageError::timeout("first")),
            Err(StorageError::timeout("second")),
            Ok(None),
        ]));

        let err = store
            .find_unique(Collection::MenuItem, "osh")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Timeout: second");
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let store = RetryingStore::new(ScriptedStore::new(vec![Err(
            StorageError::invalid_record("bad filter"),
        )]));

        let err = store
            .find_unique(Collection::MenuItem, "osh")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord { .. }));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.inner().reconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_reconnect_returns_original_error() {
        let mut scripted = ScriptedStore::new(vec![
            Err(StorageError::pool_exhausted("no idle connections")),
            Ok(None),
        ]);
        scripted.reconnect_fails = true;
        let store = RetryingStore::new(scripted);

        let err = store
            .find_unique(Collection::MenuItem, "osh")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PoolExhausted { .. }));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 1);
    }
}
