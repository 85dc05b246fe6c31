/// In-memory implementation of the store contract.
///
/// Used for tests and for running the editor without a data directory.
/// Supports failure injection so callers can exercise their
/// `StoreUnavailable` paths.
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use async_trait::async_trait;

use crate::collection::Collection;
use crate::error::{StoreError, StoreResult};
use crate::store::{ObjectStore, CURRENT_SCHEMA_VERSION};

type Tables = HashMap<Collection, BTreeMap<String, Vec<u8>>>;

/// A store that keeps every collection in process memory.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store with every collection present.
    pub fn new() -> Self {
        let tables = Collection::ALL
            .into_iter()
            .map(|collection| (collection, BTreeMap::new()))
            .collect();
        Self {
            tables: Mutex::new(tables),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent operation fail with `StoreUnavailable` until
    /// switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of records currently held in `collection`.
    pub fn len(&self, collection: Collection) -> usize {
        self.tables
            .lock()
            .map(|tables| tables.get(&collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(anyhow!("memory store marked unavailable")));
        }
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable(anyhow!("memory store lock poisoned")))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn schema_version(&self) -> u32 {
        CURRENT_SCHEMA_VERSION
    }

    async fn read_all(&self, collection: Collection) -> StoreResult<Vec<Vec<u8>>> {
        let tables = self.tables()?;
        Ok(tables
            .get(&collection)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let tables = self.tables()?;
        Ok(tables
            .get(&collection)
            .and_then(|table| table.get(key))
            .cloned())
    }

    async fn put(&self, collection: Collection, key: &str, record: Vec<u8>) -> StoreResult<()> {
        let mut tables = self.tables()?;
        tables
            .entry(collection)
            .or_default()
            .insert(key.to_owned(), record);
        Ok(())
    }

    async fn insert_new(&self, collection: Collection, key: &str, record: Vec<u8>) -> StoreResult<bool> {
        let mut tables = self.tables()?;
        let table = tables.entry(collection).or_default();
        if table.contains_key(key) {
            return Ok(false);
        }
        table.insert(key.to_owned(), record);
        Ok(true)
    }

    async fn replace_existing(
        &self,
        collection: Collection,
        key: &str,
        record: Vec<u8>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables()?;
        match tables.get_mut(&collection).and_then(|table| table.get_mut(key)) {
            Some(slot) => {
                *slot = record;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        let mut tables = self.tables()?;
        Ok(tables
            .get_mut(&collection)
            .and_then(|table| table.remove(key))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryStore::new();
        store
            .put(Collection::Tasks, "a", b"1".to_vec())
            .await
            .expect("put");
        assert_eq!(
            store.get(Collection::Tasks, "a").await.expect("get"),
            Some(b"1".to_vec())
        );
        assert_eq!(store.len(Collection::Tasks), 1);
        assert_eq!(store.len(Collection::Project), 0);
    }

    #[tokio::test]
    async fn test_unavailable_rejects_and_recovers() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let err = store
            .put(Collection::Tasks, "a", b"1".to_vec())
            .await
            .expect_err("unavailable");
        assert!(err.is_unavailable());
        assert!(store.read_all(Collection::Tasks).await.is_err());

        store.set_unavailable(false);
        store
            .put(Collection::Tasks, "a", b"1".to_vec())
            .await
            .expect("put after recovery");
        assert_eq!(store.len(Collection::Tasks), 1);
    }

    #[tokio::test]
    async fn test_conditional_writes() {
        let store = MemoryStore::new();
        assert!(store
            .insert_new(Collection::Tasks, "a", b"1".to_vec())
            .await
            .expect("insert"));
        assert!(!store
            .insert_new(Collection::Tasks, "a", b"2".to_vec())
            .await
            .expect("insert taken"));
        assert!(!store
            .replace_existing(Collection::Tasks, "b", b"3".to_vec())
            .await
            .expect("replace missing"));
        assert!(store
            .replace_existing(Collection::Tasks, "a", b"4".to_vec())
            .await
            .expect("replace"));

        assert_eq!(
            store.get(Collection::Tasks, "a").await.expect("get"),
            Some(b"4".to_vec())
        );
        assert_eq!(store.len(Collection::Tasks), 1);
    }

    #[tokio::test]
    async fn test_delete_reports_removal() {
        let store = MemoryStore::new();
        store
            .put(Collection::RepoHistory, "r", b"x".to_vec())
            .await
            .expect("put");
        assert!(store
            .delete(Collection::RepoHistory, "r")
            .await
            .expect("delete"));
        assert!(!store
            .delete(Collection::RepoHistory, "r")
            .await
            .expect("delete"));
    }
}
