/// Durable, versioned object store for editor state.
///
/// Provides an asynchronous key/value contract (`ObjectStore`) over a fixed
/// set of named collections, a redb-backed implementation for disk
/// persistence, an in-memory fake for tests, and typed accessors for the
/// project snapshot, task records and the two history logs.
pub mod accessors;
pub mod collection;
pub mod error;
pub mod memory;
pub mod records;
pub mod redb_store;
pub mod store;

pub use accessors::{HistoryLog, SnapshotAccessor, TaskAccessor};
pub use collection::{Collection, HistoryLogKind};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use records::{HistoryItem, Record, TaskRecord};
pub use redb_store::RedbStore;
pub use store::{ObjectStore, SharedStore, CURRENT_SCHEMA_VERSION};
