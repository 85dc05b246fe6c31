/// Typed accessors over the store's collections.
///
/// Each accessor holds a clone of the shared store handle. Records are
/// validated here, before anything reaches the store.
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::collection::{Collection, HistoryLogKind};
use crate::error::{StoreError, StoreResult};
use crate::records::{decode, encode, validate_key, HistoryItem, Record, TaskRecord};
use crate::store::SharedStore;

/// Reads and writes the singleton project snapshot.
#[derive(Clone)]
pub struct SnapshotAccessor {
    store: SharedStore,
}

impl SnapshotAccessor {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Overwrites the snapshot stored under `key`.
    ///
    /// # Errors
    ///
    /// `MalformedRecord` for an invalid key or an unserializable value,
    /// `Unavailable` if the write fails.
    pub async fn save_snapshot<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        validate_key(key).map_err(|reason| StoreError::malformed(Collection::Project, reason))?;
        let bytes = encode(Collection::Project, value)?;
        self.store.put(Collection::Project, key, bytes).await
    }

    /// Loads the snapshot stored under `key`, or `None` if nothing was saved.
    pub async fn load_snapshot<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.store.get(Collection::Project, key).await? {
            Some(bytes) => decode(Collection::Project, &bytes).map(Some),
            None => Ok(None),
        }
    }
}

/// Task records keyed by id.
#[derive(Clone)]
pub struct TaskAccessor {
    store: SharedStore,
}

impl TaskAccessor {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Inserts the task or replaces the one with the same id.
    pub async fn upsert(&self, task: &TaskRecord) -> StoreResult<()> {
        put_validated(&self.store, Collection::Tasks, task).await
    }

    /// Replaces an existing task.
    ///
    /// Unlike [`upsert`](Self::upsert) this refuses to create a record, so a
    /// mistyped id is reported instead of silently adding a new task.
    ///
    /// # Errors
    ///
    /// `TaskNotFound` if no task with this id is stored.
    pub async fn update(&self, task: &TaskRecord) -> StoreResult<()> {
        let bytes = encode_validated(Collection::Tasks, task)?;
        if !self
            .store
            .replace_existing(Collection::Tasks, &task.id, bytes)
            .await?
        {
            return Err(StoreError::TaskNotFound(task.id.clone()));
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> StoreResult<Option<TaskRecord>> {
        match self.store.get(Collection::Tasks, id).await? {
            Some(bytes) => decode(Collection::Tasks, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Removes the task. Returns whether it existed.
    pub async fn remove_by_id(&self, id: &str) -> StoreResult<bool> {
        self.store.delete(Collection::Tasks, id).await
    }

    /// Every stored task, in key order.
    pub async fn list_all(&self) -> StoreResult<Vec<TaskRecord>> {
        decode_all(&self.store, Collection::Tasks).await
    }
}

/// One of the two append-only history logs.
#[derive(Clone)]
pub struct HistoryLog {
    store: SharedStore,
    kind: HistoryLogKind,
}

impl HistoryLog {
    pub fn new(store: SharedStore, kind: HistoryLogKind) -> Self {
        Self { store, kind }
    }

    pub fn kind(&self) -> HistoryLogKind {
        self.kind
    }

    /// Appends an item to the log.
    ///
    /// # Errors
    ///
    /// `MalformedRecord` if the item is invalid or its id is already taken;
    /// the log never rewrites an existing entry.
    pub async fn append(&self, item: &HistoryItem) -> StoreResult<()> {
        let collection = self.kind.collection();
        let bytes = encode_validated(collection, item)?;
        if !self.store.insert_new(collection, &item.id, bytes).await? {
            return Err(StoreError::malformed(
                collection,
                format!("id {:?} already exists", item.id),
            ));
        }
        Ok(())
    }

    /// All items, newest first.
    ///
    /// Ordering is applied at read time; items with equal dates keep their
    /// key order.
    pub async fn list_all_sorted_by_date_desc(&self) -> StoreResult<Vec<HistoryItem>> {
        let mut items: Vec<HistoryItem> = decode_all(&self.store, self.kind.collection()).await?;
        items.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(items)
    }

    /// Removes one item. Returns whether it existed.
    pub async fn remove_by_id(&self, id: &str) -> StoreResult<bool> {
        self.store.delete(self.kind.collection(), id).await
    }
}

fn encode_validated<R: Record>(collection: Collection, record: &R) -> StoreResult<Vec<u8>> {
    record
        .validate()
        .map_err(|reason| StoreError::malformed(collection, reason))?;
    encode(collection, record)
}

async fn put_validated<R: Record>(store: &SharedStore, collection: Collection, record: &R) -> StoreResult<()> {
    let bytes = encode_validated(collection, record)?;
    store.put(collection, record.id(), bytes).await
}

async fn decode_all<R: Record>(store: &SharedStore, collection: Collection) -> StoreResult<Vec<R>> {
    store
        .read_all(collection)
        .await?
        .iter()
        .map(|bytes| decode(collection, bytes))
        .collect()
}
