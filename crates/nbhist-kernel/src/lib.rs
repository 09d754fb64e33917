//! # nbhist-kernel
//!
//! Edit-history persistence for notebooks.
//!
//! Every action a frontend reports goes through the [`HistoryTracker`]:
//!
//! 1. The notebook path resolves to a [`DocumentLocation`] under the data
//!    directory (canonical file, dated versions, actions database).
//! 2. The document's [`ActionWriteQueue`] diffs the action against the
//!    canonical file and lets the [`SnapshotScheduler`] rewrite it and, at
//!    most once per quiescence interval, a dated version.
//! 3. The action row is buffered and written to the [`ActionDb`] in one
//!    transaction once the burst of actions goes quiet, or immediately when
//!    the notebook closes.
//!
//! Documents are independent: each has its own queue in the
//! [`QueueRegistry`], its own locks and its own database file.

pub mod config;
pub mod db;
pub mod error;
pub mod location;
pub mod queue;
pub mod registry;
pub mod tracker;
pub mod versions;

pub use config::{ConfigError, HistoryConfig};
pub use db::{ActionDb, ActionRecord, ActivitySummary};
pub use error::HistoryError;
pub use location::{DocumentKey, DocumentLocation};
pub use queue::{ActionWriteQueue, QueueEntry, Recorded};
pub use registry::QueueRegistry;
pub use tracker::{HistoryTracker, SaveReceipt};
pub use versions::{Persisted, SnapshotScheduler};
