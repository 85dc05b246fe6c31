/// Error taxonomy for the durable object store and its collection accessors.
use thiserror::Error;

use crate::collection::Collection;

/// Convenience alias used by every store operation.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the durable object store.
///
/// Storage failures are always returned to the caller. Nothing in this crate
/// retries or substitutes a default value.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The embedded engine failed: open, transaction, commit, file lock or I/O.
    #[error("store unavailable: {0:#}")]
    Unavailable(anyhow::Error),

    /// The database on disk was written by a newer schema than requested.
    #[error("stored schema version {stored} is newer than requested version {requested}")]
    SchemaDowngrade { stored: u32, requested: u32 },

    /// A record failed validation before a write, or failed to decode on read.
    #[error("malformed record in `{collection}`: {reason}")]
    MalformedRecord {
        collection: Collection,
        reason: String,
    },

    /// `update` was called for a task id that is not stored.
    #[error("task `{0}` does not exist")]
    TaskNotFound(String),
}

impl StoreError {
    /// Whether this error came from the engine rather than from the data.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub(crate) fn malformed(collection: Collection, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            collection,
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Unavailable(err)
    }
}
