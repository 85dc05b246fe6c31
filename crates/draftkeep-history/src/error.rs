use draftkeep_store::StoreError;
use thiserror::Error;

/// Convenience alias for coordinator and timeline results.
pub type HistoryResult<T> = std::result::Result<T, HistoryError>;

/// Errors surfaced by the session timeline and the coordinator.
///
/// In-memory undo/redo never fails; everything here is either a durable
/// layer failure or a rejected request that left state untouched.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("session index {index} is out of range for {len} sessions")]
    OutOfRangeIndex { index: usize, len: usize },

    #[error("no session with id `{0}`")]
    UnknownSession(String),

    /// A value offered through `import` failed the caller's shape check.
    #[error("rejected malformed import: {0}")]
    MalformedImport(String),

    #[error("session state could not be converted: {0}")]
    SessionState(#[from] serde_json::Error),

    #[error("snapshot writer is not running")]
    WriterStopped,

    /// A detached session task panicked or was cancelled by runtime shutdown.
    #[error("session task failed: {0}")]
    SessionTask(#[from] tokio::task::JoinError),
}
