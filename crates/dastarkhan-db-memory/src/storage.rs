use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dastarkhan_storage::{
    Collection, FindMany, Reconnect, SourceStore, StorageError, StoredRecord, Transaction,
    merge_patch, payload_id, prepare_payload,
};
use papaya::HashMap as PapayaHashMap;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::Mutex;

pub type StorageKey = String; // Format: "Collection/id"

pub(crate) fn make_storage_key(collection: Collection, id: &str) -> StorageKey {
    format!("{collection}/{id}")
}

/// In-memory source store backed by a papaya lock-free HashMap.
///
/// Besides serving as the store in tests and single-node demos, it keeps
/// read/write counters and can inject failures and latency, which the cache
/// tests use to observe exactly how often the source of truth is consulted.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    pub(crate) data: Arc<PapayaHashMap<StorageKey, StoredRecord>>,
    /// Serializes transaction commits against each other.
    commit_lock: Arc<Mutex<()>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    reconnects: AtomicUsize,
    read_delay_ms: AtomicU64,
    injected: std::sync::Mutex<Vec<StorageError>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `find_many`/`find_unique` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of successful writes applied so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of `reconnect` calls so far.
    pub fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Resets the read counter.
    pub fn reset_read_count(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }

    /// Delays every read by `delay`.
    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Makes the next read fail with `error`. Queued errors are consumed in order.
    pub fn fail_next_read(&self, error: StorageError) {
        if let Ok(mut queue) = self.injected.lock() {
            queue.push(error);
        }
    }

    /// Number of records across all collections.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn begin_read(&self) -> Result<(), StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let injected = self
            .injected
            .lock()
            .ok()
            .and_then(|mut queue| (!queue.is_empty()).then(|| queue.remove(0)));
        match injected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn snapshot(&self, collection: Collection) -> Vec<StoredRecord> {
        let guard = self.data.pin();
        guard
            .iter()
            .filter(|(_, record)| record.collection == collection)
            .map(|(_, record)| record.clone())
            .collect()
    }

    fn get(&self, collection: Collection, id: &str) -> Option<StoredRecord> {
        let guard = self.data.pin();
        guard.get(&make_storage_key(collection, id)).cloned()
    }

    fn put(&self, record: StoredRecord) {
        let guard = self.data.pin();
        guard.insert(make_storage_key(record.collection, &record.id), record);
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn remove(&self, collection: Collection, id: &str) -> bool {
        let guard = self.data.pin();
        let removed = guard.remove(&make_storage_key(collection, id)).is_some();
        if removed {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }
}

/// Applies filters, ordering and limit the way a relational backend would.
pub(crate) fn apply_query(mut records: Vec<StoredRecord>, query: &FindMany) -> Vec<StoredRecord> {
    records.retain(|r| query.matches(r));
    match &query.order {
        Some(sort) => {
            records.sort_by(|a, b| {
                let ord = compare_field(a, b, &sort.field);
                if sort.descending { ord.reverse() } else { ord }
            });
        }
        None => records.sort_by(|a, b| a.id.cmp(&b.id)),
    }
    if let Some(limit) = query.limit {
        records.truncate(limit);
    }
    records
}

fn compare_field(a: &StoredRecord, b: &StoredRecord, field: &str) -> CmpOrdering {
    if field == "id" {
        return a.id.cmp(&b.id);
    }
    match (a.data.get(field), b.data.get(field)) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        _ => CmpOrdering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl SourceStore for InMemoryStore {
    async fn find_many(
        &self,
        collection: Collection,
        query: &FindMany,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        self.begin_read().await?;
        Ok(apply_query(self.snapshot(collection), query))
    }

    async fn find_unique(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<StoredRecord>, StorageError> {
        self.begin_read().await?;
        Ok(self.get(collection, id))
    }

    async fn create(
        &self,
        collection: Collection,
        data: &Value,
    ) -> Result<StoredRecord, StorageError> {
        let id = payload_id(data);
        let payload = prepare_payload(data, &id)?;
        let record = StoredRecord::new(collection, &id, payload);

        let guard = self.data.pin();
        if guard
            .try_insert(make_storage_key(collection, &id), record.clone())
            .is_err()
        {
            return Err(StorageError::already_exists(collection, id));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: &Value,
    ) -> Result<StoredRecord, StorageError> {
        let mut record = self
            .get(collection, id)
            .ok_or_else(|| StorageError::not_found(collection, id))?;
        merge_patch(&mut record.data, patch)?;
        record.updated_at = OffsetDateTime::now_utc();
        self.put(record.clone());
        Ok(record)
    }

    async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        data: &Value,
    ) -> Result<StoredRecord, StorageError> {
        let payload = prepare_payload(data, id)?;
        let record = match self.get(collection, id) {
            Some(existing) => StoredRecord {
                data: payload,
                updated_at: OffsetDateTime::now_utc(),
                ..existing
            },
            None => StoredRecord::new(collection, id, payload),
        };
        self.put(record.clone());
        Ok(record)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StorageError> {
        if self.remove(collection, id) {
            Ok(())
        } else {
            Err(StorageError::not_found(collection, id))
        }
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError> {
        Ok(Box::new(InMemoryTransaction::new(self.clone_handle())))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl Reconnect for InMemoryStore {
    async fn reconnect(&self) -> Result<(), StorageError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("In-memory store has no connection to rebuild");
        Ok(())
    }
}

impl InMemoryStore {
    fn clone_handle(&self) -> StoreHandle {
        StoreHandle {
            data: self.data.clone(),
            commit_lock: self.commit_lock.clone(),
        }
    }
}

/// Shared view of the store's map used by transactions.
#[derive(Debug, Clone)]
pub(crate) struct StoreHandle {
    data: Arc<PapayaHashMap<StorageKey, StoredRecord>>,
    commit_lock: Arc<Mutex<()>>,
}

/// Buffered transaction: writes are staged in an overlay and applied on commit.
///
/// Validation (existence, conflicts) happens against base state plus the
/// overlay at the time of each call. Dropping the transaction discards it.
#[derive(Debug)]
pub struct InMemoryTransaction {
    store: StoreHandle,
    /// `None` marks a staged delete.
    staged: HashMap<StorageKey, Option<StoredRecord>>,
}

impl InMemoryTransaction {
    pub(crate) fn new(store: StoreHandle) -> Self {
        Self {
            store,
            staged: HashMap::new(),
        }
    }

    fn current(&self, collection: Collection, id: &str) -> Option<StoredRecord> {
        let key = make_storage_key(collection, id);
        match self.staged.get(&key) {
            Some(staged) => staged.clone(),
            None => self.store.data.pin().get(&key).cloned(),
        }
    }

    fn stage(&mut self, collection: Collection, id: &str, record: Option<StoredRecord>) {
        self.staged.insert(make_storage_key(collection, id), record);
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let InMemoryTransaction { store, staged } = *self;
        let _commit = store.commit_lock.lock().await;
        let guard = store.data.pin();
        for (key, record) in staged {
            match record {
                Some(record) => {
                    guard.insert(key, record);
                }
                None => {
                    guard.remove(&key);
                }
            }
        }
        tracing::debug!("In-memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        tracing::debug!(staged = self.staged.len(), "In-memory transaction rolled back");
        Ok(())
    }

    async fn create(
        &mut self,
        collection: Collection,
        data: &Value,
    ) -> Result<StoredRecord, StorageError> {
        let id = payload_id(data);
        if self.current(collection, &id).is_some() {
            return Err(StorageError::already_exists(collection, id));
        }
        let record = StoredRecord::new(collection, &id, prepare_payload(data, &id)?);
        self.stage(collection, &id, Some(record.clone()));
        Ok(record)
    }

    async fn update(
        &mut self,
        collection: Collection,
        id: &str,
        patch: &Value,
    ) -> Result<StoredRecord, StorageError> {
        let mut record = self
            .current(collection, id)
            .ok_or_else(|| StorageError::not_found(collection, id))?;
        merge_patch(&mut record.data, patch)?;
        record.updated_at = OffsetDateTime::now_utc();
        self.stage(collection, id, Some(record.clone()));
        Ok(record)
    }

    async fn upsert(
        &mut self,
        collection: Collection,
        id: &str,
        data: &Value,
    ) -> Result<StoredRecord, StorageError> {
        let payload = prepare_payload(data, id)?;
        let record = match self.current(collection, id) {
            Some(existing) => StoredRecord {
                data: payload,
                updated_at: OffsetDateTime::now_utc(),
                ..existing
            },
            None => StoredRecord::new(collection, id, payload),
        };
        self.stage(collection, id, Some(record.clone()));
        Ok(record)
    }

    async fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StorageError> {
        if self.current(collection, id).is_none() {
            return Err(StorageError::not_found(collection, id));
        }
        self.stage(collection, id, None);
        Ok(())
    }

    async fn find_unique(
        &mut self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<StoredRecord>, StorageError> {
        Ok(self.current(collection, id))
    }
}
