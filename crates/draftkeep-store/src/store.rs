/// The asynchronous object store contract shared by the redb engine and the
/// in-memory fake.
use std::sync::Arc;

use async_trait::async_trait;

use crate::collection::Collection;
use crate::error::StoreResult;

/// Schema version understood by this build.
///
/// Bump when a collection is added; the upgrade step creates missing tables
/// without touching existing data.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// An owned, shareable store handle.
pub type SharedStore = Arc<dyn ObjectStore>;

/// Versioned key/value store exposing the fixed set of named collections.
///
/// Each call is a single transaction. There are no cross-call transactions;
/// conditional writes go through `insert_new` / `replace_existing`, which
/// check and write inside one transaction.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Schema version this handle was opened at.
    fn schema_version(&self) -> u32;

    /// Returns every record in the collection, fully materialized.
    async fn read_all(&self, collection: Collection) -> StoreResult<Vec<Vec<u8>>>;

    /// Returns the record stored under `key`, if any.
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Inserts or replaces the record stored under `key`.
    async fn put(&self, collection: Collection, key: &str, record: Vec<u8>) -> StoreResult<()>;

    /// Writes `record` only if `key` is absent. Returns `false` and writes
    /// nothing when the key is already taken.
    async fn insert_new(&self, collection: Collection, key: &str, record: Vec<u8>) -> StoreResult<bool>;

    /// Overwrites the record under `key` only if one exists. Returns `false`
    /// and writes nothing when the key is missing.
    async fn replace_existing(
        &self,
        collection: Collection,
        key: &str,
        record: Vec<u8>,
    ) -> StoreResult<bool>;

    /// Removes the record under `key`. Returns whether a record was removed.
    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool>;
}
