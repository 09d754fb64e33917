//! Entry point for frontends: route actions to their document's queue.

use std::path::Path;

use nbhist_types::ActionEvent;

use crate::config::HistoryConfig;
use crate::db::{ActionDb, ActivitySummary};
use crate::error::HistoryError;
use crate::location::{DocumentKey, DocumentLocation};
use crate::queue::Recorded;
use crate::registry::QueueRegistry;

/// What [`HistoryTracker::save_changes`] hands back to the frontend.
#[derive(Debug, Clone)]
pub struct SaveReceipt {
    /// `<dirhash>/<stem><ext>`, relative to the data directory.
    pub hashed_nb_path: String,
    pub recorded: Recorded,
}

/// Owns the configuration and every document's write queue.
pub struct HistoryTracker {
    config: HistoryConfig,
    registry: QueueRegistry,
}

impl HistoryTracker {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            registry: QueueRegistry::new(config.clone()),
            config,
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn registry(&self) -> &QueueRegistry {
        &self.registry
    }

    /// Storage paths for the notebook at `notebook_path`.
    pub fn locate(&self, notebook_path: &Path) -> DocumentLocation {
        DocumentLocation::resolve(&self.config.data_directory, notebook_path)
    }

    /// Record one action against the notebook at `notebook_path`.
    ///
    /// Storage directories are created on demand. A notebook's queue is
    /// dropped from the registry once its `notebook-closed` action has been
    /// written and nothing else is in flight for it.
    pub async fn save_changes(
        &self,
        notebook_path: &Path,
        action: ActionEvent,
    ) -> Result<SaveReceipt, HistoryError> {
        let location = self.locate(notebook_path);
        let closing = action.ends_session();

        let queue = self.registry.get_or_create(&location);
        let recorded = queue.record(action).await?;
        drop(queue);

        if closing && self.registry.evict_idle(&location.key) {
            tracing::debug!(key = %location.key, "notebook closed, queue released");
        }

        tracing::debug!(
            key = %location.key,
            changed = recorded.diff.changes.len(),
            queued = recorded.queued,
            "saved changes"
        );

        Ok(SaveReceipt {
            hashed_nb_path: location.hashed_notebook_path(),
            recorded,
        })
    }

    /// Activity for the notebook between `start` and `end` (Unix ms,
    /// inclusive). Pending actions are flushed first so they are counted.
    pub async fn summary(
        &self,
        notebook_path: &Path,
        start: i64,
        end: i64,
    ) -> Result<ActivitySummary, HistoryError> {
        let location = self.locate(notebook_path);

        if let Some(queue) = self.registry.get(&location.key) {
            queue.flush().await?;
        }

        let db_path = location.db_path;
        let summary = tokio::task::spawn_blocking(move || -> rusqlite::Result<ActivitySummary> {
            if !db_path.exists() {
                return Ok(ActivitySummary::default());
            }
            ActionDb::open(&db_path)?.activity_summary(start, end)
        })
        .await??;

        Ok(summary)
    }

    /// Flush every queue and drop them. Returns documents whose actions
    /// could not be written.
    pub async fn shutdown(&self) -> Vec<(DocumentKey, HistoryError)> {
        let failures = self.registry.shutdown().await;
        tracing::info!(failed = failures.len(), "history tracker stopped");
        failures
    }
}
