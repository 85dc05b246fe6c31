/// Coordinator: composes the history manager, the session timeline and the
/// durable store.
///
/// Mutations are serialized through one async mutex. Live-state changes are
/// published on a watch channel that feeds the debounced snapshot writer.
/// Session operations that touch a durable log run on a spawned task, so a
/// caller that stops awaiting cannot leave the log and the timeline apart.
/// The undo position and the session cursor stay two separate state
/// machines; the coordinator only decides when one drives the other.
use std::future::Future;
use std::sync::Arc;

use draftkeep_store::{
    HistoryItem, HistoryLog, HistoryLogKind, RedbStore, SharedStore,
    SnapshotAccessor, TaskAccessor, TaskRecord, CURRENT_SCHEMA_VERSION,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::HistoryConfig;
use crate::error::{HistoryError, HistoryResult};
use crate::manager::{Equality, HistoryManager};
use crate::timeline::{Session, SessionTimeline};
use crate::writer::{PersistEvent, SnapshotWriter, WriterCommand};

/// Capacity of the persisted-write event channel.
const EVENT_CAPACITY: usize = 64;

/// Capacity of the writer command queue.
const COMMAND_CAPACITY: usize = 8;

/// Bounds required of the live state value.
pub trait StateValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StateValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Shape check applied to externally supplied state.
pub type Validator<T> = Box<dyn Fn(&T) -> Result<(), String> + Send + Sync>;

/// Whether a new session is also written to a durable history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPersistence {
    /// Kept in memory only.
    Ephemeral,
    /// Appended to the given history log.
    Persisted(HistoryLogKind),
}

impl SessionPersistence {
    fn log(self) -> Option<HistoryLogKind> {
        match self {
            Self::Ephemeral => None,
            Self::Persisted(kind) => Some(kind),
        }
    }
}

struct Inner<T> {
    history: HistoryManager<T>,
    timeline: SessionTimeline<T>,
}

/// State reachable from detached session tasks.
struct Shared<T> {
    inner: Mutex<Inner<T>>,
    state_tx: watch::Sender<T>,
    repo_history: HistoryLog,
    article_history: HistoryLog,
}

impl<T: StateValue> Shared<T> {
    fn log(&self, kind: HistoryLogKind) -> &HistoryLog {
        match kind {
            HistoryLogKind::Repo => &self.repo_history,
            HistoryLogKind::Article => &self.article_history,
        }
    }

    fn publish(&self, history: &HistoryManager<T>) {
        self.state_tx.send_replace(history.present().clone());
    }

    async fn append_session(&self, session: Session<T>) -> HistoryResult<Session<T>> {
        let mut inner = self.inner.lock().await;

        if let Some(kind) = session.log {
            self.log(kind).append(&session_item(&session)?).await?;
        }

        let state = session.state.clone();
        inner.timeline.push(session.clone());
        if inner.history.set(state) {
            self.publish(&inner.history);
        }
        tracing::debug!(session = %session.id, persisted = session.is_persisted(), "appended session");
        Ok(session)
    }

    async fn delete_session(&self, id: &str) -> HistoryResult<Session<T>> {
        let mut inner = self.inner.lock().await;
        let index = inner
            .timeline
            .position(id)
            .ok_or_else(|| HistoryError::UnknownSession(id.to_string()))?;

        if let Some(kind) = inner.timeline.sessions()[index].log {
            self.log(kind).remove_by_id(id).await?;
        }
        inner.timeline.remove(id)
    }
}

/// Loads the persisted project snapshot, if one was saved.
///
/// # Errors
///
/// Propagates store failures and decode errors; a missing snapshot is `Ok(None)`.
pub async fn load_initial_state<T: DeserializeOwned>(
    store: &SharedStore,
    key: &str,
) -> HistoryResult<Option<T>> {
    let state = SnapshotAccessor::new(Arc::clone(store))
        .load_snapshot(key)
        .await?;
    Ok(state)
}

/// Owns the live state, its undo history, the session timeline and the
/// store handle.
pub struct Coordinator<T> {
    shared: Arc<Shared<T>>,
    commands: mpsc::Sender<WriterCommand>,
    events: broadcast::Sender<PersistEvent>,
    writer: JoinHandle<()>,
    tasks: TaskAccessor,
    validator: Option<Validator<T>>,
    config: HistoryConfig,
}

impl<T> std::fmt::Debug for Coordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

impl<T: StateValue + PartialEq> Coordinator<T> {
    /// Opens the on-disk store in `config.data_dir` and starts a coordinator
    /// with structural equality.
    ///
    /// # Errors
    ///
    /// `SchemaDowngrade` if the data was written by a newer build,
    /// `Unavailable` if the store cannot be opened or read.
    pub async fn open(config: HistoryConfig, fallback: T) -> HistoryResult<Self> {
        let store: SharedStore =
            Arc::new(RedbStore::open(&config.data_dir, CURRENT_SCHEMA_VERSION).await?);
        Self::start(store, config, fallback).await
    }

    /// Starts a coordinator over `store` with structural equality.
    pub async fn start(store: SharedStore, config: HistoryConfig, fallback: T) -> HistoryResult<Self> {
        Self::start_with_equality(store, config, fallback, <T as PartialEq>::eq).await
    }
}

impl<T: StateValue> Coordinator<T> {
    /// Starts a coordinator with an explicit change test.
    ///
    /// Seeds the live state from the persisted snapshot, or `fallback` when
    /// none exists, and spawns the snapshot writer. Must be called inside a
    /// tokio runtime.
    pub async fn start_with_equality(
        store: SharedStore,
        config: HistoryConfig,
        fallback: T,
        same: Equality<T>,
    ) -> HistoryResult<Self> {
        let live = match load_initial_state::<T>(&store, &config.snapshot_key).await? {
            Some(state) => {
                tracing::info!(key = %config.snapshot_key, "restored persisted snapshot");
                state
            }
            None => {
                tracing::info!("no persisted snapshot, starting fresh");
                fallback
            }
        };

        let history = HistoryManager::with_equality(live.clone(), same)
            .with_max_depth(config.max_undo_depth);
        let (state_tx, state_rx) = watch::channel(live);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let writer = SnapshotWriter::new(
            SnapshotAccessor::new(Arc::clone(&store)),
            config.snapshot_key.clone(),
            config.debounce(),
            state_rx,
            command_rx,
            events.clone(),
        );
        let writer = tokio::spawn(writer.run());

        Ok(Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    history,
                    timeline: SessionTimeline::new(),
                }),
                state_tx,
                repo_history: HistoryLog::new(Arc::clone(&store), HistoryLogKind::Repo),
                article_history: HistoryLog::new(Arc::clone(&store), HistoryLogKind::Article),
            }),
            commands: command_tx,
            events,
            writer,
            tasks: TaskAccessor::new(store),
            validator: None,
            config,
        })
    }

    /// Installs the shape check used by [`import`](Self::import).
    pub fn with_validator(
        mut self,
        validator: impl Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    // ── Live state ────────────────────────────────────────────────────

    /// A copy of the live state.
    pub fn state(&self) -> T {
        self.shared.state_tx.borrow().clone()
    }

    /// Receiver that observes every live-state change.
    pub fn watch_state(&self) -> watch::Receiver<T> {
        self.shared.state_tx.subscribe()
    }

    /// Replaces the live state. Returns whether anything changed.
    pub async fn set(&self, value: T) -> bool {
        let mut inner = self.shared.inner.lock().await;
        let changed = inner.history.set(value);
        if changed {
            self.shared.publish(&inner.history);
        }
        changed
    }

    /// Derives the next live state from the current one.
    pub async fn update(&self, updater: impl FnOnce(&T) -> T + Send) -> bool {
        let mut inner = self.shared.inner.lock().await;
        let changed = inner.history.update(updater);
        if changed {
            self.shared.publish(&inner.history);
        }
        changed
    }

    /// Applies externally supplied state after the shape check.
    ///
    /// # Errors
    ///
    /// `MalformedImport` if the validator rejects the value; the undo stack
    /// is untouched.
    pub async fn import(&self, value: T) -> HistoryResult<bool> {
        if let Some(validator) = &self.validator {
            validator(&value).map_err(HistoryError::MalformedImport)?;
        }
        Ok(self.set(value).await)
    }

    pub async fn undo(&self) -> bool {
        let mut inner = self.shared.inner.lock().await;
        let changed = inner.history.undo();
        if changed {
            self.shared.publish(&inner.history);
        }
        changed
    }

    pub async fn redo(&self) -> bool {
        let mut inner = self.shared.inner.lock().await;
        let changed = inner.history.redo();
        if changed {
            self.shared.publish(&inner.history);
        }
        changed
    }

    pub async fn can_undo(&self) -> bool {
        self.shared.inner.lock().await.history.can_undo()
    }

    pub async fn can_redo(&self) -> bool {
        self.shared.inner.lock().await.history.can_redo()
    }

    /// Runs `f` against the history manager under the mutation lock.
    pub async fn with_history<R>(&self, f: impl FnOnce(&HistoryManager<T>) -> R) -> R {
        f(&self.shared.inner.lock().await.history)
    }

    // ── Sessions ──────────────────────────────────────────────────────

    /// Sessions in chronological order.
    pub async fn sessions(&self) -> Vec<Session<T>> {
        self.shared.inner.lock().await.timeline.sessions().to_vec()
    }

    /// Sessions newest first, as shown to the user.
    pub async fn sessions_newest_first(&self) -> Vec<Session<T>> {
        self.shared
            .inner
            .lock()
            .await
            .timeline
            .newest_first()
            .cloned()
            .collect()
    }

    /// Storage index of the current session, `None` when there are none.
    pub async fn current_session_index(&self) -> Option<usize> {
        self.shared.inner.lock().await.timeline.current_index()
    }

    /// Runs `f` against the session timeline under the mutation lock.
    pub async fn with_timeline<R>(&self, f: impl FnOnce(&SessionTimeline<T>) -> R) -> R {
        f(&self.shared.inner.lock().await.timeline)
    }

    /// Records a new session and makes its state live.
    ///
    /// Persisted sessions are written to their log first; if that write
    /// fails nothing changes in memory. The work runs to completion even if
    /// this future is dropped.
    pub async fn append_session(
        &self,
        prompt: impl Into<String>,
        state: T,
        persistence: SessionPersistence,
    ) -> HistoryResult<Session<T>> {
        let session = Session::new(prompt, state, persistence.log());
        let shared = Arc::clone(&self.shared);
        detached(async move { shared.append_session(session).await }).await
    }

    /// Makes the session at storage `index` current and republishes its
    /// state as a fresh edit (this clears redo).
    ///
    /// # Errors
    ///
    /// `OutOfRangeIndex` for an invalid index; nothing changes.
    pub async fn jump_to_session(&self, index: usize) -> HistoryResult<()> {
        let mut inner = self.shared.inner.lock().await;
        let state = inner.timeline.jump(index)?.state.clone();
        if inner.history.set(state) {
            self.shared.publish(&inner.history);
        }
        Ok(())
    }

    /// Deletes a session from its durable log (if any) and from memory.
    ///
    /// The live state is left as is. Like `append_session`, the work is not
    /// abandoned when this future is dropped.
    ///
    /// # Errors
    ///
    /// `UnknownSession` for an unknown id, or a store error if the durable
    /// delete fails; in both cases the timeline is unchanged.
    pub async fn delete_session(&self, id: &str) -> HistoryResult<Session<T>> {
        let shared = Arc::clone(&self.shared);
        let id = id.to_owned();
        detached(async move { shared.delete_session(&id).await }).await
    }

    /// Rebuilds the timeline from sessions persisted in the given logs.
    ///
    /// Entries without a prompt and state are regular history items and are
    /// skipped. The live state is not touched. Returns the session count.
    pub async fn restore_sessions(&self, kinds: &[HistoryLogKind]) -> HistoryResult<usize> {
        let mut inner = self.shared.inner.lock().await;

        let mut sessions = Vec::new();
        for &kind in kinds {
            for item in self.shared.log(kind).list_all_sorted_by_date_desc().await? {
                match session_from_item(item, kind)? {
                    Some(session) => sessions.push(session),
                    None => tracing::debug!(?kind, "skipping history item without session state"),
                }
            }
        }
        sessions.sort_by(|a: &Session<T>, b: &Session<T>| {
            a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id))
        });

        let count = sessions.len();
        inner.timeline = SessionTimeline::from_sessions(sessions);
        tracing::info!(count, "restored sessions");
        Ok(count)
    }

    // ── Persistence ───────────────────────────────────────────────────

    /// Receiver notified after every durable snapshot write.
    pub fn subscribe_to_persisted_writes(&self) -> broadcast::Receiver<PersistEvent> {
        self.events.subscribe()
    }

    /// Writes the live state now, bypassing the debounce window.
    ///
    /// # Errors
    ///
    /// The store error if the write fails, or `WriterStopped`.
    pub async fn flush(&self) -> HistoryResult<()> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(WriterCommand::Flush(ack))
            .await
            .map_err(|_| HistoryError::WriterStopped)?;
        done.await.map_err(|_| HistoryError::WriterStopped)??;
        Ok(())
    }

    /// Flushes pending changes and stops the snapshot writer.
    pub async fn shutdown(self) -> HistoryResult<()> {
        let result = self.flush().await;
        let Self {
            shared,
            commands,
            writer,
            ..
        } = self;
        drop(commands);
        drop(shared);
        if let Err(error) = writer.await {
            tracing::warn!(%error, "snapshot writer task failed");
        }
        result
    }

    pub async fn list_tasks(&self) -> HistoryResult<Vec<TaskRecord>> {
        Ok(self.tasks.list_all().await?)
    }

    pub async fn upsert_task(&self, task: &TaskRecord) -> HistoryResult<()> {
        Ok(self.tasks.upsert(task).await?)
    }

    /// Replaces an existing task; fails with `TaskNotFound` if it is missing.
    pub async fn update_task(&self, task: &TaskRecord) -> HistoryResult<()> {
        Ok(self.tasks.update(task).await?)
    }

    pub async fn remove_task(&self, id: &str) -> HistoryResult<bool> {
        Ok(self.tasks.remove_by_id(id).await?)
    }

    pub async fn list_repo_history(&self) -> HistoryResult<Vec<HistoryItem>> {
        Ok(self.shared.repo_history.list_all_sorted_by_date_desc().await?)
    }

    pub async fn append_repo_history(&self, item: &HistoryItem) -> HistoryResult<()> {
        Ok(self.shared.repo_history.append(item).await?)
    }

    pub async fn list_article_history(&self) -> HistoryResult<Vec<HistoryItem>> {
        Ok(self.shared.article_history.list_all_sorted_by_date_desc().await?)
    }

    pub async fn append_article_history(&self, item: &HistoryItem) -> HistoryResult<()> {
        Ok(self.shared.article_history.append(item).await?)
    }
}

/// Runs `task` on its own tokio task and waits for it. Dropping the returned
/// future leaves the task running.
async fn detached<R, F>(task: F) -> HistoryResult<R>
where
    F: Future<Output = HistoryResult<R>> + Send + 'static,
    R: Send + 'static,
{
    tokio::spawn(task).await?
}

fn session_item<T: Serialize>(session: &Session<T>) -> HistoryResult<HistoryItem> {
    Ok(HistoryItem::new(session.id.as_str(), session.timestamp)
        .with_field("prompt", session.prompt.as_str())
        .with_field("state", serde_json::to_value(&session.state)?))
}

fn session_from_item<T: DeserializeOwned>(
    mut item: HistoryItem,
    kind: HistoryLogKind,
) -> HistoryResult<Option<Session<T>>> {
    let (Some(prompt), Some(state)) = (item.fields.remove("prompt"), item.fields.remove("state"))
    else {
        return Ok(None);
    };
    let Some(prompt) = prompt.as_str().map(str::to_owned) else {
        return Ok(None);
    };
    Ok(Some(Session {
        id: item.id,
        prompt,
        timestamp: item.date,
        state: serde_json::from_value(state)?,
        log: Some(kind),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftkeep_store::MemoryStore;

    async fn coordinator() -> (Arc<MemoryStore>, Coordinator<String>) {
        let store = Arc::new(MemoryStore::new());
        let config = HistoryConfig {
            debounce_ms: 20,
            ..HistoryConfig::default()
        };
        let coordinator = Coordinator::start(store.clone(), config, String::new())
            .await
            .expect("start");
        (store, coordinator)
    }

    #[test]
    fn test_session_item_round_trip() {
        let session = Session::new("write intro", vec![1, 2, 3], Some(HistoryLogKind::Repo));
        let item = session_item(&session).expect("encode");
        assert_eq!(item.id, session.id);
        assert_eq!(item.date, session.timestamp);

        let decoded: Session<Vec<i32>> = session_from_item(item, HistoryLogKind::Repo)
            .expect("decode")
            .expect("session");
        assert_eq!(decoded, session);
    }

    #[test]
    fn test_plain_history_item_is_not_a_session() {
        let item = HistoryItem::new("h1", 5).with_field("repo", "draftkeep");
        let decoded = session_from_item::<String>(item, HistoryLogKind::Repo).expect("decode");
        assert!(decoded.is_none());
    }

    #[tokio::test]
    async fn test_set_publishes_to_watchers() {
        let (_, coordinator) = coordinator().await;
        let mut rx = coordinator.watch_state();

        assert!(coordinator.set("draft".to_string()).await);
        rx.changed().await.expect("changed");
        assert_eq!(*rx.borrow(), "draft");
        assert!(!coordinator.set("draft".to_string()).await);
    }

    #[tokio::test]
    async fn test_import_rejects_before_undo_stack() {
        let (_, coordinator) = coordinator().await;
        let coordinator = coordinator.with_validator(|value: &String| {
            if value.starts_with('{') {
                Ok(())
            } else {
                Err("expected a JSON object".to_string())
            }
        });

        let err = coordinator
            .import("plain".to_string())
            .await
            .expect_err("rejected");
        assert!(matches!(err, HistoryError::MalformedImport(_)));
        assert!(!coordinator.can_undo().await);
        assert_eq!(coordinator.state(), "");

        assert!(coordinator.import("{}".to_string()).await.expect("accepted"));
        assert!(coordinator.can_undo().await);
    }

    #[tokio::test]
    async fn test_shutdown_writes_pending_state() {
        let (store, coordinator) = coordinator().await;
        coordinator.set("unsaved".to_string()).await;
        coordinator.shutdown().await.expect("shutdown");

        let snapshots = SnapshotAccessor::new(store);
        let saved: Option<String> = snapshots.load_snapshot("current").await.expect("load");
        assert_eq!(saved.as_deref(), Some("unsaved"));
    }

    #[tokio::test]
    async fn test_restore_skips_plain_items() {
        let (_, coordinator) = coordinator().await;
        coordinator
            .append_session("persisted", "p".to_string(), SessionPersistence::Persisted(HistoryLogKind::Article))
            .await
            .expect("append");
        coordinator
            .append_article_history(&HistoryItem::new("plain", 1).with_field("title", "notes"))
            .await
            .expect("append item");

        let restored = coordinator
            .restore_sessions(&[HistoryLogKind::Article])
            .await
            .expect("restore");
        assert_eq!(restored, 1);
        assert_eq!(coordinator.sessions().await[0].prompt, "persisted");
    }

    #[tokio::test]
    async fn test_restore_orders_equal_timestamps_by_id() {
        let (_, coordinator) = coordinator().await;
        for (id, kind) in [
            ("b", HistoryLogKind::Repo),
            ("a", HistoryLogKind::Repo),
            ("c", HistoryLogKind::Article),
        ] {
            let session = Session {
                id: id.to_string(),
                prompt: format!("prompt {id}"),
                timestamp: 42,
                state: id.to_string(),
                log: Some(kind),
            };
            coordinator
                .shared
                .log(kind)
                .append(&session_item(&session).expect("encode"))
                .await
                .expect("append");
        }

        coordinator
            .restore_sessions(&[HistoryLogKind::Repo, HistoryLogKind::Article])
            .await
            .expect("restore");
        let ids: Vec<String> = coordinator
            .sessions()
            .await
            .into_iter()
            .map(|session| session.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
