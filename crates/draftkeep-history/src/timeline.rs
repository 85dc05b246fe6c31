/// Session timeline: named, timestamped checkpoints of the live state.
///
/// Sessions are kept in chronological order and the current index is always
/// a storage index. Display order is newest first; use
/// `display_to_storage` / `storage_to_display` to translate.
///
/// This pointer is independent of the history manager's undo position. The
/// coordinator composes the two.
use draftkeep_store::HistoryLogKind;
use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, HistoryResult};

/// One checkpoint: the state produced by a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session<T> {
    pub id: String,
    pub prompt: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub state: T,
    /// Durable log this session was written to; `None` for ephemeral ones.
    #[serde(default)]
    pub log: Option<HistoryLogKind>,
}

impl<T> Session<T> {
    /// Creates a session with a fresh id and the current time.
    pub fn new(prompt: impl Into<String>, state: T, log: Option<HistoryLogKind>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            state,
            log,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.log.is_some()
    }
}

/// Ordered, append-only log of sessions with a current-session cursor.
#[derive(Debug, Clone)]
pub struct SessionTimeline<T> {
    sessions: Vec<Session<T>>,
    current: Option<usize>,
}

impl<T> Default for SessionTimeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SessionTimeline<T> {
    pub fn new() -> Self {
        Self {
            sessions: Vec::new(),
            current: None,
        }
    }

    /// Rebuilds a timeline from chronologically ordered sessions, pointing
    /// at the newest one.
    pub fn from_sessions(sessions: Vec<Session<T>>) -> Self {
        let current = sessions.len().checked_sub(1);
        Self { sessions, current }
    }

    /// Sessions in chronological order.
    pub fn sessions(&self) -> &[Session<T>] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Storage index of the current session, `None` when empty.
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Session<T>> {
        self.current.and_then(|index| self.sessions.get(index))
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.sessions.iter().position(|session| session.id == id)
    }

    /// Creates and appends a new session, making it current.
    pub fn append(
        &mut self,
        prompt: impl Into<String>,
        state: T,
        log: Option<HistoryLogKind>,
    ) -> &Session<T> {
        self.push(Session::new(prompt, state, log))
    }

    /// Appends an already built session, making it current.
    pub fn push(&mut self, session: Session<T>) -> &Session<T> {
        self.sessions.push(session);
        let index = self.sessions.len() - 1;
        self.current = Some(index);
        &self.sessions[index]
    }

    /// Moves the cursor to `index`.
    ///
    /// # Errors
    ///
    /// `OutOfRangeIndex` if `index` is past the end; the cursor is unchanged.
    pub fn jump(&mut self, index: usize) -> HistoryResult<&Session<T>> {
        if index >= self.sessions.len() {
            return Err(HistoryError::OutOfRangeIndex {
                index,
                len: self.sessions.len(),
            });
        }
        self.current = Some(index);
        Ok(&self.sessions[index])
    }

    /// Removes the session with `id`, keeping the cursor on the same logical
    /// session where possible.
    ///
    /// Removing the current session leaves the cursor at the same position
    /// (the next newer session), clamped to the last one.
    ///
    /// # Errors
    ///
    /// `UnknownSession` if no session has this id; nothing changes.
    pub fn remove(&mut self, id: &str) -> HistoryResult<Session<T>> {
        let index = self
            .position(id)
            .ok_or_else(|| HistoryError::UnknownSession(id.to_string()))?;
        let removed = self.sessions.remove(index);

        self.current = match self.current {
            _ if self.sessions.is_empty() => None,
            Some(current) if index < current => Some(current - 1),
            Some(current) => Some(current.min(self.sessions.len() - 1)),
            None => None,
        };
        Ok(removed)
    }

    /// Sessions newest first, for display.
    pub fn newest_first(&self) -> impl Iterator<Item = &Session<T>> {
        self.sessions.iter().rev()
    }

    /// Maps a newest-first display position to a storage index.
    pub fn display_to_storage(&self, display: usize) -> Option<usize> {
        (display < self.sessions.len()).then(|| self.sessions.len() - 1 - display)
    }

    /// Maps a storage index to its newest-first display position.
    pub fn storage_to_display(&self, storage: usize) -> Option<usize> {
        (storage < self.sessions.len()).then(|| self.sessions.len() - 1 - storage)
    }
}
