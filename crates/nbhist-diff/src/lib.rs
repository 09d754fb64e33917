//! Block-level change detection for notebook history.
//!
//! Given the last persisted document and a new [`ActionEvent`], the
//! [`DiffEngine`] reports which blocks changed and the current block order.
//!
//! # Two comparison modes
//!
//! - **By id**: when every block on both sides carries a unique
//!   `comet_cell_id` ([`identity::valid`]), blocks are matched by id. New ids
//!   are always reported; known ids are reported when their content differs.
//! - **By position**: otherwise the action's [`ActionClass`] selects a few
//!   candidate positions ([`heuristics::candidates`]) and only those are
//!   compared.
//!
//! Nothing in this crate fails for a missing prior document, missing ids, or
//! an unknown action. Those resolve to a baseline diff, positional mode, and
//! no candidates respectively. Only reading an unreadable or corrupt canonical
//! file returns a [`DiffError`].
//!
//! [`ActionEvent`]: nbhist_types::ActionEvent
//! [`ActionClass`]: nbhist_types::ActionClass

mod engine;
mod error;
pub mod heuristics;
pub mod identity;

pub use engine::{ChangeSet, Diff, DiffEngine, DocumentOrder, different, read_prior};
pub use error::DiffError;

/// Result type for change detection.
pub type Result<T> = std::result::Result<T, DiffError>;
