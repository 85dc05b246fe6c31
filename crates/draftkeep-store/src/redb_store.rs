/// Durable object store backed by redb.
///
/// Uses a single redb database file with one table per collection plus a
/// `meta` table holding the schema version. Every trait call is exactly one
/// redb transaction, executed on tokio's blocking pool.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};

use crate::collection::{Collection, META_TABLE};
use crate::error::{StoreError, StoreResult};
use crate::store::ObjectStore;

/// File name of the database inside the data directory.
const DB_FILE_NAME: &str = "draftkeep.redb";

/// Key of the schema record in the meta table.
const SCHEMA_KEY: &str = "schema";

/// Schema metadata persisted in the meta table.
#[derive(Debug, Serialize, Deserialize)]
struct SchemaMeta {
    version: u32,
}

/// redb-backed implementation of [`ObjectStore`].
///
/// Cheap to clone; all clones share one open database. Dropping the last
/// clone releases the file so the store can be opened again.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    path: PathBuf,
    schema_version: u32,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("path", &self.path)
            .field("schema_version", &self.schema_version)
            .finish()
    }
}

impl RedbStore {
    /// Returns the database file path for a data directory.
    pub fn db_path(data_dir: &Path) -> PathBuf {
        data_dir.join(DB_FILE_NAME)
    }

    /// Opens or creates the store in `data_dir` at `schema_version`.
    ///
    /// Idempotent: missing collections are created, existing ones are left
    /// alone. Opening at a newer version than stored runs the upgrade step.
    ///
    /// # Errors
    ///
    /// Returns `SchemaDowngrade` if the file was written by a newer schema,
    /// and `Unavailable` if the directory or database cannot be opened
    /// (including when another handle already holds the file).
    pub async fn open(data_dir: impl AsRef<Path>, schema_version: u32) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || Self::open_blocking(&data_dir, schema_version))
            .await
            .map_err(|e| StoreError::Unavailable(anyhow!("store open task failed: {e}")))?
    }

    fn open_blocking(data_dir: &Path, schema_version: u32) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).with_context(|| {
            format!("Failed to create data directory: {}", data_dir.display())
        })?;

        let db_path = Self::db_path(data_dir);
        let db = Database::create(&db_path)
            .with_context(|| format!("Failed to open store database: {}", db_path.display()))?;

        migrate(&db, schema_version)?;

        tracing::debug!(path = %db_path.display(), schema_version, "opened store");
        Ok(Self {
            db: Arc::new(db),
            path: db_path,
            schema_version,
        })
    }

    /// Path of the open database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs one store operation on the blocking pool.
    async fn blocking<R, F>(&self, op: F) -> StoreResult<R>
    where
        F: FnOnce(&Database) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StoreError::Unavailable(anyhow!("store task failed: {e}")))?
    }
}

/// Brings the schema up to `requested` inside a single write transaction.
fn migrate(db: &Database, requested: u32) -> StoreResult<()> {
    let write_txn = db
        .begin_write()
        .context("Failed to begin schema transaction")?;

    let stored = {
        let meta = write_txn
            .open_table(META_TABLE)
            .context("Failed to open meta table")?;
        let stored = match meta.get(SCHEMA_KEY).context("Failed to read schema")? {
            Some(guard) => {
                let schema: SchemaMeta = bincode::deserialize(guard.value())
                    .context("Failed to deserialize schema metadata")?;
                Some(schema.version)
            }
            None => None,
        };
        stored
    };

    if let Some(stored) = stored.filter(|&v| v > requested) {
        write_txn
            .abort()
            .context("Failed to abort schema transaction")?;
        return Err(StoreError::SchemaDowngrade { stored, requested });
    }

    {
        for collection in Collection::ALL {
            let _ = write_txn
                .open_table(collection.table())
                .with_context(|| format!("Failed to create {collection} table"))?;
        }

        if stored != Some(requested) {
            let bytes = bincode::serialize(&SchemaMeta { version: requested })
                .context("Failed to serialize schema metadata")?;
            let mut meta = write_txn
                .open_table(META_TABLE)
                .context("Failed to open meta table")?;
            meta.insert(SCHEMA_KEY, bytes.as_slice())
                .context("Failed to write schema version")?;
        }
    }
    write_txn
        .commit()
        .context("Failed to commit schema transaction")?;

    match stored {
        None => tracing::info!(version = requested, "initialized store schema"),
        Some(from) if from < requested => {
            tracing::info!(from, to = requested, "upgraded store schema")
        }
        Some(_) => {}
    }
    Ok(())
}

fn read_all_records(db: &Database, collection: Collection) -> StoreResult<Vec<Vec<u8>>> {
    let read_txn = db
        .begin_read()
        .context("Failed to begin read transaction")?;
    let table = read_txn
        .open_table(collection.table())
        .with_context(|| format!("Failed to open {collection} table"))?;

    let mut records = Vec::new();
    for entry in table
        .iter()
        .with_context(|| format!("Failed to iterate {collection} table"))?
    {
        let (_, value_guard) = entry.context("Failed to read record")?;
        records.push(value_guard.value().to_vec());
    }
    Ok(records)
}

fn get_record(db: &Database, collection: Collection, key: &str) -> StoreResult<Option<Vec<u8>>> {
    let read_txn = db
        .begin_read()
        .context("Failed to begin read transaction")?;
    let table = read_txn
        .open_table(collection.table())
        .with_context(|| format!("Failed to open {collection} table"))?;

    match table.get(key).context("Failed to read record")? {
        Some(guard) => Ok(Some(guard.value().to_vec())),
        None => Ok(None),
    }
}

fn put_record(db: &Database, collection: Collection, key: &str, record: &[u8]) -> StoreResult<()> {
    let write_txn = db
        .begin_write()
        .context("Failed to begin write transaction")?;
    {
        let mut table = write_txn
            .open_table(collection.table())
            .with_context(|| format!("Failed to open {collection} table"))?;
        table
            .insert(key, record)
            .context("Failed to insert record")?;
    }
    write_txn
        .commit()
        .context("Failed to commit write transaction")?;
    Ok(())
}

/// Writes `record` when the presence of `key` matches `must_exist`.
fn put_record_if(
    db: &Database,
    collection: Collection,
    key: &str,
    record: &[u8],
    must_exist: bool,
) -> StoreResult<bool> {
    let write_txn = db
        .begin_write()
        .context("Failed to begin write transaction")?;
    let written = {
        let mut table = write_txn
            .open_table(collection.table())
            .with_context(|| format!("Failed to open {collection} table"))?;
        let exists = table.get(key).context("Failed to read record")?.is_some();
        if exists == must_exist {
            table
                .insert(key, record)
                .context("Failed to insert record")?;
            true
        } else {
            false
        }
    };
    if written {
        write_txn
            .commit()
            .context("Failed to commit write transaction")?;
    } else {
        write_txn
            .abort()
            .context("Failed to abort write transaction")?;
    }
    Ok(written)
}

fn delete_record(db: &Database, collection: Collection, key: &str) -> StoreResult<bool> {
    let write_txn = db
        .begin_write()
        .context("Failed to begin write transaction")?;
    let removed = {
        let mut table = write_txn
            .open_table(collection.table())
            .with_context(|| format!("Failed to open {collection} table"))?;
        let removed = table
            .remove(key)
            .context("Failed to remove record")?
            .is_some();
        removed
    };
    write_txn.commit().context("Failed to commit deletion")?;
    Ok(removed)
}

#[async_trait]
impl ObjectStore for RedbStore {
    fn schema_version(&self) -> u32 {
        self.schema_version
    }

    async fn read_all(&self, collection: Collection) -> StoreResult<Vec<Vec<u8>>> {
        self.blocking(move |db| read_all_records(db, collection))
            .await
    }

    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let key = key.to_owned();
        self.blocking(move |db| get_record(db, collection, &key))
            .await
    }

    async fn put(&self, collection: Collection, key: &str, record: Vec<u8>) -> StoreResult<()> {
        tracing::debug!(%collection, key, bytes = record.len(), "put record");
        let key = key.to_owned();
        self.blocking(move |db| put_record(db, collection, &key, &record))
            .await
    }

    async fn insert_new(&self, collection: Collection, key: &str, record: Vec<u8>) -> StoreResult<bool> {
        tracing::debug!(%collection, key, bytes = record.len(), "insert new record");
        let key = key.to_owned();
        self.blocking(move |db| put_record_if(db, collection, &key, &record, false))
            .await
    }

    async fn replace_existing(
        &self,
        collection: Collection,
        key: &str,
        record: Vec<u8>,
    ) -> StoreResult<bool> {
        tracing::debug!(%collection, key, bytes = record.len(), "replace record");
        let key = key.to_owned();
        self.blocking(move |db| put_record_if(db, collection, &key, &record, true))
            .await
    }

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        tracing::debug!(%collection, key, "delete record");
        let key = key.to_owned();
        self.blocking(move |db| delete_record(db, collection, &key))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CURRENT_SCHEMA_VERSION;
    use tempfile::TempDir;

    async fn open_test_store() -> (RedbStore, TempDir) {
        let dir = TempDir::new().expect("create temp dir");
        let store = RedbStore::open(dir.path(), CURRENT_SCHEMA_VERSION)
            .await
            .expect("open store");
        (store, dir)
    }

    #[tokio::test]
    async fn test_open_creates_all_collections() {
        let (store, _dir) = open_test_store().await;
        for collection in Collection::ALL {
            let records = store.read_all(collection).await.expect("read all");
            assert!(records.is_empty());
        }
        assert!(store.path().ends_with(DB_FILE_NAME));
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (store, _dir) = open_test_store().await;

        store
            .put(Collection::Tasks, "t1", b"one".to_vec())
            .await
            .expect("put");
        let loaded = store.get(Collection::Tasks, "t1").await.expect("get");
        assert_eq!(loaded.as_deref(), Some(&b"one"[..]));

        assert!(store.delete(Collection::Tasks, "t1").await.expect("delete"));
        assert!(!store.delete(Collection::Tasks, "t1").await.expect("delete"));
        assert!(store
            .get(Collection::Tasks, "t1")
            .await
            .expect("get")
            .is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_existing() {
        let (store, _dir) = open_test_store().await;

        store
            .put(Collection::Project, "current", b"original".to_vec())
            .await
            .expect("put");
        store
            .put(Collection::Project, "current", b"updated".to_vec())
            .await
            .expect("overwrite");

        let all = store.read_all(Collection::Project).await.expect("read all");
        assert_eq!(all, vec![b"updated".to_vec()]);
    }

    #[tokio::test]
    async fn test_conditional_writes_check_inside_transaction() {
        let (store, _dir) = open_test_store().await;

        assert!(store
            .insert_new(Collection::ArticleHistory, "a1", b"first".to_vec())
            .await
            .expect("insert"));
        assert!(!store
            .insert_new(Collection::ArticleHistory, "a1", b"second".to_vec())
            .await
            .expect("insert taken"));
        let loaded = store
            .get(Collection::ArticleHistory, "a1")
            .await
            .expect("get");
        assert_eq!(loaded.as_deref(), Some(&b"first"[..]));

        assert!(!store
            .replace_existing(Collection::Tasks, "missing", b"x".to_vec())
            .await
            .expect("replace missing"));
        assert!(store
            .read_all(Collection::Tasks)
            .await
            .expect("read all")
            .is_empty());
        assert!(store
            .replace_existing(Collection::ArticleHistory, "a1", b"third".to_vec())
            .await
            .expect("replace"));
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let (store, _dir) = open_test_store().await;

        store
            .put(Collection::RepoHistory, "same", b"repo".to_vec())
            .await
            .expect("put repo");
        store
            .put(Collection::ArticleHistory, "same", b"article".to_vec())
            .await
            .expect("put article");

        store
            .delete(Collection::RepoHistory, "same")
            .await
            .expect("delete");
        let article = store
            .get(Collection::ArticleHistory, "same")
            .await
            .expect("get");
        assert_eq!(article.as_deref(), Some(&b"article"[..]));
    }

    #[tokio::test]
    async fn test_reopen_preserves_data() {
        let dir = TempDir::new().expect("create temp dir");

        {
            let store = RedbStore::open(dir.path(), CURRENT_SCHEMA_VERSION)
                .await
                .expect("open");
            store
                .put(Collection::Tasks, "keep", b"me".to_vec())
                .await
                .expect("put");
        }

        {
            let store = RedbStore::open(dir.path(), CURRENT_SCHEMA_VERSION)
                .await
                .expect("reopen");
            let loaded = store.get(Collection::Tasks, "keep").await.expect("get");
            assert_eq!(loaded.as_deref(), Some(&b"me"[..]));
        }
    }

    #[tokio::test]
    async fn test_upgrade_keeps_existing_records() {
        let dir = TempDir::new().expect("create temp dir");

        {
            let store = RedbStore::open(dir.path(), 1).await.expect("open v1");
            store
                .put(Collection::ArticleHistory, "a1", b"old".to_vec())
                .await
                .expect("put");
        }

        let store = RedbStore::open(dir.path(), 2).await.expect("open v2");
        assert_eq!(store.schema_version(), 2);
        let loaded = store
            .get(Collection::ArticleHistory, "a1")
            .await
            .expect("get");
        assert_eq!(loaded.as_deref(), Some(&b"old"[..]));
    }

    #[tokio::test]
    async fn test_downgrade_is_rejected() {
        let dir = TempDir::new().expect("create temp dir");

        {
            let store = RedbStore::open(dir.path(), 3).await.expect("open v3");
            store
                .put(Collection::Tasks, "t", b"v3 data".to_vec())
                .await
                .expect("put");
        }

        let err = RedbStore::open(dir.path(), 2)
            .await
            .expect_err("downgrade must fail");
        assert!(matches!(
            err,
            StoreError::SchemaDowngrade {
                stored: 3,
                requested: 2
            }
        ));

        // The newer data is still there for a newer build.
        let store = RedbStore::open(dir.path(), 3).await.expect("reopen v3");
        assert!(store
            .get(Collection::Tasks, "t")
            .await
            .expect("get")
            .is_some());
    }

    #[tokio::test]
    async fn test_second_handle_is_unavailable() {
        let (_store, dir) = open_test_store().await;
        let err = RedbStore::open(dir.path(), CURRENT_SCHEMA_VERSION)
            .await
            .expect_err("file is already open");
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_clones_share_database() {
        let (store, _dir) = open_test_store().await;
        let other = store.clone();

        other
            .put(Collection::Tasks, "shared", b"x".to_vec())
            .await
            .expect("put");
        assert!(store
            .get(Collection::Tasks, "shared")
            .await
            .expect("get")
            .is_some());
    }
}
