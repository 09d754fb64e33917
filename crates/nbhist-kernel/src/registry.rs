//! Write queues keyed by document identity.
//!
//! Uses DashMap so routing an action to its queue never blocks other
//! documents. Queues are created lazily on the first action.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::HistoryConfig;
use crate::error::HistoryError;
use crate::location::{DocumentKey, DocumentLocation};
use crate::queue::ActionWriteQueue;

/// Every live [`ActionWriteQueue`], one per document.
pub struct QueueRegistry {
    config: HistoryConfig,
    queues: DashMap<DocumentKey, Arc<ActionWriteQueue>>,
}

impl QueueRegistry {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            queues: DashMap::new(),
        }
    }

    /// The queue for `location`, created on first use.
    pub fn get_or_create(&self, location: &DocumentLocation) -> Arc<ActionWriteQueue> {
        self.queues
            .entry(location.key.clone())
            .or_insert_with(|| {
                tracing::debug!(key = %location.key, "new write queue");
                Arc::new(ActionWriteQueue::new(location.clone(), &self.config))
            })
            .value()
            .clone()
    }

    pub fn get(&self, key: &DocumentKey) -> Option<Arc<ActionWriteQueue>> {
        self.queues.get(key).map(|q| Arc::clone(q.value()))
    }

    /// Drop the queue for `key` if nothing is pending and no request or
    /// timer still holds it. Returns whether it was removed.
    ///
    /// The check runs under the map's shard lock, so a concurrent
    /// `get_or_create` either sees the old queue before removal or makes a
    /// fresh one after.
    pub fn evict_idle(&self, key: &DocumentKey) -> bool {
        self.queues
            .remove_if(key, |_, queue| {
                Arc::strong_count(queue) == 1 && queue.pending_len() == 0
            })
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Flush every queue, collecting failures per document.
    pub async fn flush_all(&self) -> Vec<(DocumentKey, HistoryError)> {
        let mut failures = Vec::new();
        for (key, queue) in self.snapshot() {
            if let Err(e) = queue.flush().await {
                failures.push((key, e));
            }
        }
        failures
    }

    /// Cancel pending timers, flush everything, and drop all queues.
    pub async fn shutdown(&self) -> Vec<(DocumentKey, HistoryError)> {
        let mut failures = Vec::new();
        for (key, queue) in self.snapshot() {
            if let Err(e) = queue.close().await {
                tracing::error!(key = %key, error = %e, "unflushed actions at shutdown");
                failures.push((key, e));
            }
        }
        self.queues.clear();
        failures
    }

    /// Clone out the map so no shard lock is held across an await.
    fn snapshot(&self) -> Vec<(DocumentKey, Arc<ActionWriteQueue>)> {
        self.queues
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect()
    }
}
