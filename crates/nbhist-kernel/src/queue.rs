//! Per-document action write queue.
//!
//! Frontends report many small actions in bursts. Each action is diffed and
//! persisted to the document files immediately, but its database row is
//! buffered and written with its neighbours once the burst goes quiet:
//!
//! ```text
//! record(A) ─┐  record(B) ─┐  record(C) ─┐
//!            arm           cancel+arm     cancel+arm ──(quiet)──▶ flush [A, B, C]
//! ```
//!
//! `notebook-closed` skips the wait and flushes before returning. A failed
//! flush keeps every entry queued, ahead of anything appended since.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use nbhist_diff::{Diff, DiffEngine};
use nbhist_types::ActionEvent;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::HistoryConfig;
use crate::db::ActionDb;
use crate::error::HistoryError;
use crate::location::DocumentLocation;
use crate::versions::{Persisted, SnapshotScheduler};

/// One buffered row of the actions table, already encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub time: i64,
    pub name: String,
    pub index: i64,
    /// JSON list of selected indices.
    pub selected_cells: String,
    /// JSON list of block keys.
    pub cell_order: String,
    /// JSON bytes of the change set.
    pub diff: Vec<u8>,
}

impl QueueEntry {
    pub fn encode(action: &ActionEvent, diff: &Diff) -> serde_json::Result<Self> {
        Ok(Self {
            time: action.time,
            name: action.name.clone(),
            index: action.index as i64,
            selected_cells: serde_json::to_string(&action.indices)?,
            cell_order: serde_json::to_string(&diff.order)?,
            diff: serde_json::to_vec(&diff.changes)?,
        })
    }
}

/// Outcome of [`ActionWriteQueue::record`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub diff: Diff,
    /// False when the event was suppressed or action tracking is off.
    pub queued: bool,
    pub persisted: Persisted,
}

/// Serializing owner of one document's history.
pub struct ActionWriteQueue {
    location: DocumentLocation,
    engine: DiffEngine,
    scheduler: SnapshotScheduler,
    track_actions: bool,
    flush_delay: Duration,
    pending: Mutex<Vec<QueueEntry>>,
    /// Cancels the armed delayed flush, if any.
    timer: Mutex<Option<CancellationToken>>,
    /// Orders diff + persist across concurrent `record` calls.
    record_lock: tokio::sync::Mutex<()>,
    /// One flush in flight.
    flush_lock: tokio::sync::Mutex<()>,
}

impl ActionWriteQueue {
    pub fn new(location: DocumentLocation, config: &HistoryConfig) -> Self {
        Self {
            location,
            engine: DiffEngine::new(config.compare_outputs),
            scheduler: SnapshotScheduler::new(config.version_interval(), config.track_versions),
            track_actions: config.track_actions,
            flush_delay: config.flush_delay(),
            pending: Mutex::new(Vec::new()),
            timer: Mutex::new(None),
            record_lock: tokio::sync::Mutex::new(()),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn location(&self) -> &DocumentLocation {
        &self.location
    }

    /// Number of entries waiting for a flush.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Diff `action` against the canonical document, persist the document,
    /// and queue the action row.
    ///
    /// Concurrent calls are applied in the order they first wait on the
    /// queue; nothing is awaited before that point.
    pub async fn record(self: &Arc<Self>, action: ActionEvent) -> Result<Recorded, HistoryError> {
        let _serial = self.record_lock.lock().await;

        let location = self.location.clone();
        let engine = self.engine;
        let scheduler = self.scheduler;
        let (action, diff, persisted) =
            tokio::task::spawn_blocking(move || -> Result<_, HistoryError> {
                location.ensure_dirs()?;
                let diff = engine.compute_from_file(&location.canonical_path, &action)?;
                let now = Local::now().naive_local();
                let persisted = scheduler.persist(&location, &action.model, &diff, now)?;
                Ok((action, diff, persisted))
            })
            .await??;

        if action.is_suppressible() && diff.is_empty() {
            tracing::debug!(key = %self.location.key, action = %action.name, "suppressed unchanged action");
            return Ok(Recorded {
                diff,
                queued: false,
                persisted,
            });
        }

        if !self.track_actions {
            return Ok(Recorded {
                diff,
                queued: false,
                persisted,
            });
        }

        let entry = QueueEntry::encode(&action, &diff)?;
        self.pending.lock().push(entry);
        self.cancel_timer();

        if action.ends_session() {
            self.flush().await?;
        } else {
            self.arm_timer();
        }

        Ok(Recorded {
            diff,
            queued: true,
            persisted,
        })
    }

    /// Write every pending entry as one batch.
    ///
    /// Entries are removed only after the batch commits. Returns the number
    /// of rows written.
    pub async fn flush(&self) -> Result<usize, HistoryError> {
        let _guard = self.flush_lock.lock().await;

        let batch = self.pending.lock().clone();
        if batch.is_empty() {
            return Ok(0);
        }

        let db_path = self.location.db_path.clone();
        let result = tokio::task::spawn_blocking(move || -> rusqlite::Result<usize> {
            let mut db = ActionDb::open(&db_path)?;
            db.insert_batch(&batch)
        })
        .await?;

        match result {
            Ok(n) => {
                self.pending.lock().drain(..n);
                tracing::debug!(key = %self.location.key, rows = n, "flushed actions");
                Ok(n)
            }
            Err(e) => {
                tracing::error!(
                    key = %self.location.key,
                    pending = self.pending_len(),
                    error = %e,
                    "action flush failed, entries kept"
                );
                Err(e.into())
            }
        }
    }

    /// Cancel any armed flush and write what is pending.
    pub async fn close(&self) -> Result<usize, HistoryError> {
        self.cancel_timer();
        self.flush().await
    }

    fn cancel_timer(&self) {
        if let Some(token) = self.timer.lock().take() {
            token.cancel();
        }
    }

    /// Flush after `flush_delay` unless cancelled first. Once the delay has
    /// elapsed the flush runs to completion.
    fn arm_timer(self: &Arc<Self>) {
        let token = CancellationToken::new();
        *self.timer.lock() = Some(token.clone());

        let queue = Arc::clone(self);
        let delay = self.flush_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = queue.flush().await {
                        tracing::warn!(key = %queue.location.key, error = %e, "delayed flush failed");
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbhist_types::{Block, Document};
    use std::path::Path;

    fn queue(dir: &Path, delay_ms: u64) -> Arc<ActionWriteQueue> {
        let mut config = HistoryConfig::default().with_data_directory(dir);
        config.flush_delay_ms = delay_ms;
        let location = DocumentLocation::resolve(dir, Path::new("/work/nb.ipynb"));
        location.ensure_dirs().unwrap();
        Arc::new(ActionWriteQueue::new(location, &config))
    }

    fn event(time: i64, name: &str, sources: &[&str]) -> ActionEvent {
        let doc = Document::new(sources.iter().map(|s| Block::code(*s)).collect());
        ActionEvent::new(time, name, 0, doc)
    }

    fn stored_names(q: &ActionWriteQueue) -> Vec<String> {
        match ActionDb::open(&q.location().db_path) {
            Ok(db) => db.action_names().unwrap(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_order_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), 60_000);

        q.record(event(1, "run-cell", &["a"])).await.unwrap();
        q.record(event(2, "insert-cell-below", &["a", ""])).await.unwrap();
        q.record(event(3, "delete-cell", &["a"])).await.unwrap();
        assert_eq!(q.pending_len(), 3);

        assert_eq!(q.flush().await.unwrap(), 3);
        assert_eq!(q.pending_len(), 0);
        assert_eq!(
            stored_names(&q),
            vec!["run-cell", "insert-cell-below", "delete-cell"]
        );
    }

    #[tokio::test]
    async fn test_burst_coalesces_into_one_flush() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), 300);

        q.record(event(1, "run-cell", &["a"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        q.record(event(2, "run-cell", &["b"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        q.record(event(3, "run-cell", &["c"])).await.unwrap();

        // first timer would have fired by now had it not been re-armed
        assert_eq!(q.pending_len(), 3);
        assert!(stored_names(&q).is_empty());

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(q.pending_len(), 0);
        assert_eq!(stored_names(&q).len(), 3);
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), 60_000);

        // a directory where the database should be makes every open fail
        std::fs::create_dir_all(&q.location().db_path).unwrap();

        q.record(event(1, "run-cell", &["a"])).await.unwrap();
        q.record(event(2, "run-cell", &["b"])).await.unwrap();
        let err = q.flush().await.unwrap_err();
        assert!(matches!(err, HistoryError::Storage(_)));
        assert_eq!(q.pending_len(), 2);

        q.record(event(3, "insert-cell-above", &["", "b"])).await.unwrap();
        std::fs::remove_dir(&q.location().db_path).unwrap();

        assert_eq!(q.flush().await.unwrap(), 3);
        assert_eq!(q.pending_len(), 0);
        assert_eq!(
            stored_names(&q),
            vec!["run-cell", "run-cell", "insert-cell-above"]
        );
    }

    #[tokio::test]
    async fn test_unchanged_unselect_is_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), 60_000);

        q.record(event(1, "run-cell", &["a"])).await.unwrap();
        let recorded = q.record(event(2, "unselect-cell", &["a"])).await.unwrap();

        assert!(!recorded.queued);
        assert!(recorded.diff.is_empty());
        assert_eq!(recorded.persisted, Persisted::Unchanged);
        assert_eq!(q.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_changed_unselect_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), 60_000);

        q.record(event(1, "run-cell", &["a"])).await.unwrap();
        let recorded = q.record(event(2, "unselect-cell", &["a + 1"])).await.unwrap();

        assert!(recorded.queued);
        assert_eq!(recorded.diff.changes.len(), 1);
        assert_eq!(recorded.persisted, Persisted::Canonical);
        assert_eq!(q.pending_len(), 2);
    }

    #[tokio::test]
    async fn test_notebook_closed_flushes_now() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), 60_000);

        q.record(event(1, "run-cell", &["a"])).await.unwrap();
        q.record(event(2, "notebook-closed", &["a"])).await.unwrap();

        assert_eq!(q.pending_len(), 0);
        assert_eq!(stored_names(&q), vec!["run-cell", "notebook-closed"]);
    }

    #[tokio::test]
    async fn test_action_tracking_off() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HistoryConfig::default().with_data_directory(dir.path());
        config.track_actions = false;
        let location = DocumentLocation::resolve(dir.path(), Path::new("/work/nb.ipynb"));
        location.ensure_dirs().unwrap();
        let q = Arc::new(ActionWriteQueue::new(location, &config));

        let recorded = q.record(event(1, "run-cell", &["a"])).await.unwrap();

        assert!(!recorded.queued);
        assert!(q.location().canonical_path.exists());
        assert_eq!(q.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_close_cancels_timer_and_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), 60_000);

        q.record(event(1, "run-cell", &["a"])).await.unwrap();
        assert_eq!(q.close().await.unwrap(), 1);
        assert_eq!(stored_names(&q), vec!["run-cell"]);
        assert_eq!(q.close().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_flushes_neither_duplicate_nor_drop() {
        let dir = tempfile::tempdir().unwrap();
        let q = queue(dir.path(), 1);

        let mut flushes = Vec::new();
        for i in 0..200 {
            let source = format!("x = {}", i);
            q.record(event(i, "run-cell", &[source.as_str()])).await.unwrap();
            let q = q.clone();
            flushes.push(tokio::spawn(async move { q.flush().await }));
        }
        for flush in flushes {
            flush.await.unwrap().unwrap();
        }
        q.close().await.unwrap();

        let db = ActionDb::open(&q.location().db_path).unwrap();
        let times: Vec<i64> = db
            .actions_between(0, i64::MAX)
            .unwrap()
            .iter()
            .map(|r| r.time)
            .collect();
        assert_eq!(times, (0..200).collect::<Vec<_>>());
        assert_eq!(q.pending_len(), 0);
    }

    #[test]
    fn test_entry_encoding() {
        let action = event(7, "run-cell", &["x"]).with_indices(vec![0, 1]);
        let diff = DiffEngine::default().compute(None, &action);

        let entry = QueueEntry::encode(&action, &diff).unwrap();
        assert_eq!(entry.time, 7);
        assert_eq!(entry.selected_cells, "[0,1]");
        assert_eq!(entry.cell_order, "[0]");
        assert_eq!(entry.diff, b"{}");
    }
}
