/// Debounced snapshot writer.
///
/// Runs as a single background task. Every live-state change pushes a
/// trailing deadline forward; when the deadline passes, the writer captures
/// the value current at that moment and saves it. Explicit flushes go
/// through the same task, so writes never overlap and an older value can
/// never land after a newer one.
use std::time::Duration;

use draftkeep_store::{SnapshotAccessor, StoreResult};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;

/// Notification sent to subscribers after each durable snapshot write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistEvent {
    /// The snapshot was written. `at` is milliseconds since the Unix epoch.
    Saved { at: i64 },
    /// A snapshot write failed; the state stays dirty and is retried on the
    /// next change or flush.
    Failed { error: String },
}

pub(crate) enum WriterCommand {
    Flush(oneshot::Sender<StoreResult<()>>),
}

pub(crate) struct SnapshotWriter<T> {
    snapshots: SnapshotAccessor,
    key: String,
    debounce: Duration,
    state_rx: watch::Receiver<T>,
    commands: mpsc::Receiver<WriterCommand>,
    events: broadcast::Sender<PersistEvent>,
    deadline: Option<Instant>,
    dirty: bool,
}

impl<T> SnapshotWriter<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    pub(crate) fn new(
        snapshots: SnapshotAccessor,
        key: String,
        debounce: Duration,
        state_rx: watch::Receiver<T>,
        commands: mpsc::Receiver<WriterCommand>,
        events: broadcast::Sender<PersistEvent>,
    ) -> Self {
        Self {
            snapshots,
            key,
            debounce,
            state_rx,
            commands,
            events,
            deadline: None,
            dirty: false,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let sleep_duration = self
                .deadline
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::from_secs(3600));

            tokio::select! {
                changed = self.state_rx.changed() => {
                    if changed.is_err() {
                        tracing::debug!("live state closed, stopping snapshot writer");
                        break;
                    }
                    self.dirty = true;
                    self.deadline = Some(Instant::now() + self.debounce);
                }
                command = self.commands.recv() => match command {
                    Some(WriterCommand::Flush(ack)) => {
                        let result = self.flush().await;
                        let _ = ack.send(result);
                    }
                    None => break,
                },
                _ = tokio::time::sleep(sleep_duration), if self.deadline.is_some() => {
                    if let Err(error) = self.flush().await {
                        tracing::warn!(%error, "debounced snapshot write failed");
                    }
                }
            }
        }

        // Flush any pending change before shutting down
        if self.dirty {
            if let Err(error) = self.flush().await {
                tracing::error!(%error, "failed to write snapshot on shutdown");
            }
        }
        tracing::debug!("snapshot writer stopped");
    }

    async fn flush(&mut self) -> StoreResult<()> {
        self.deadline = None;
        if matches!(self.state_rx.has_changed(), Ok(true)) {
            self.dirty = true;
        }
        if !self.dirty {
            return Ok(());
        }

        // Capture at write time, not at schedule time.
        let value = self.state_rx.borrow_and_update().clone();
        match self.snapshots.save_snapshot(&self.key, &value).await {
            Ok(()) => {
                self.dirty = false;
                let at = chrono::Utc::now().timestamp_millis();
                tracing::debug!(key = %self.key, "snapshot saved");
                let _ = self.events.send(PersistEvent::Saved { at });
                Ok(())
            }
            Err(error) => {
                let _ = self.events.send(PersistEvent::Failed {
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }
}
