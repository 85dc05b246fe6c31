/// Undo/redo history, session timeline and debounced persistence for a
/// single live project value.
///
/// `HistoryManager` is pure and synchronous. `Coordinator` wraps it with the
/// session timeline and a durable store, writing snapshots in the background
/// through a debounced writer task.
pub mod config;
pub mod coordinator;
pub mod error;
pub mod manager;
pub mod timeline;
mod writer;

pub use config::HistoryConfig;
pub use coordinator::{load_initial_state, Coordinator, SessionPersistence, StateValue, Validator};
pub use error::{HistoryError, HistoryResult};
pub use manager::{Equality, HistoryManager};
pub use timeline::{Session, SessionTimeline};
pub use writer::PersistEvent;
