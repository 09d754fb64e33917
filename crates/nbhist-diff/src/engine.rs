//! Change-set computation between the persisted and the current document.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use nbhist_types::{ActionEvent, Block, BlockKey, Document, Output};

use crate::error::DiffError;
use crate::{heuristics, identity};

/// Changed or new blocks, keyed by id or position, in current-document order.
pub type ChangeSet = IndexMap<BlockKey, Block>;

/// Keys of every block in the current document, in order.
pub type DocumentOrder = Vec<BlockKey>;

/// Result of one diff computation.
#[derive(Clone, Debug, PartialEq)]
pub struct Diff {
    /// Blocks that changed or appeared.
    pub changes: ChangeSet,
    /// Structural order of the current document.
    pub order: DocumentOrder,
    /// True when there was no prior document to compare against.
    pub baseline: bool,
}

impl Diff {
    /// Check if no block changed.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Computes change sets for action events.
#[derive(Clone, Copy, Debug)]
pub struct DiffEngine {
    compare_outputs: bool,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DiffEngine {
    /// Create an engine. With `compare_outputs`, code blocks whose outputs
    /// differ count as changed even when their source is identical.
    pub fn new(compare_outputs: bool) -> Self {
        Self { compare_outputs }
    }

    /// Whether outputs take part in block comparison.
    pub fn compare_outputs(&self) -> bool {
        self.compare_outputs
    }

    /// Diff `action` against the canonical document stored at `path`.
    ///
    /// This is the only I/O the engine does: one read of the prior document.
    pub fn compute_from_file(&self, path: &Path, action: &ActionEvent) -> Result<Diff, DiffError> {
        let prior = read_prior(path)?;
        Ok(self.compute(prior.as_ref(), action))
    }

    /// Diff `action`'s document against `prior`.
    pub fn compute(&self, prior: Option<&Document>, action: &ActionEvent) -> Diff {
        let current = &action.model.cells;

        let Some(prior) = prior else {
            let order = match identity::sequence_ids(current) {
                Some(ids) => ids.into_iter().map(BlockKey::Id).collect(),
                None => positional_order(current),
            };
            return Diff {
                changes: ChangeSet::new(),
                order,
                baseline: true,
            };
        };

        match identity::resolve(&prior.cells, current) {
            Some((prior_ids, current_ids)) => {
                self.by_id(&prior.cells, &prior_ids, current, current_ids)
            }
            None => {
                tracing::debug!(action = %action.name, "no stable block ids, diffing by position");
                self.by_position(&prior.cells, action)
            }
        }
    }

    fn by_id(
        &self,
        prior: &[Block],
        prior_ids: &[String],
        current: &[Block],
        current_ids: Vec<String>,
    ) -> Diff {
        let prior_by_id: HashMap<&str, &Block> = prior_ids
            .iter()
            .map(String::as_str)
            .zip(prior.iter())
            .collect();

        let mut changes = ChangeSet::new();
        for (id, block) in current_ids.iter().zip(current) {
            let changed = match prior_by_id.get(id.as_str()) {
                Some(old) => different(old, block, self.compare_outputs),
                None => true,
            };
            if changed {
                changes.insert(BlockKey::Id(id.clone()), block.clone());
            }
        }

        Diff {
            changes,
            order: current_ids.into_iter().map(BlockKey::Id).collect(),
            baseline: false,
        }
    }

    fn by_position(&self, prior: &[Block], action: &ActionEvent) -> Diff {
        let current = &action.model.cells;
        let mut changes = ChangeSet::new();

        for i in heuristics::candidates_for(action, prior) {
            let Some(block) = current.get(i) else {
                continue;
            };
            let changed = match prior.get(i) {
                Some(old) => different(old, block, self.compare_outputs),
                None => true,
            };
            if changed {
                changes.insert(BlockKey::Index(i), block.clone());
            }
        }
        changes.sort_keys();

        Diff {
            changes,
            order: positional_order(current),
            baseline: false,
        }
    }
}

fn positional_order(blocks: &[Block]) -> DocumentOrder {
    (0..blocks.len()).map(BlockKey::Index).collect()
}

/// Read the canonical document, `None` if it does not exist yet.
pub fn read_prior(path: &Path) -> Result<Option<Document>, DiffError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(DiffError::ReadPrior {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    Document::from_json(&text)
        .map(Some)
        .map_err(|source| DiffError::CorruptPrior {
            path: path.to_path_buf(),
            source,
        })
}

/// Whether two blocks differ.
///
/// Kind and source always count. With `compare_outputs`, code blocks also
/// compare output count, then each output's type and its type-specific
/// payload.
pub fn different(a: &Block, b: &Block, compare_outputs: bool) -> bool {
    if a.cell_type != b.cell_type || a.source != b.source {
        return true;
    }
    if !compare_outputs || !b.is_code() {
        return false;
    }

    let (old, new) = (a.outputs(), b.outputs());
    old.len() != new.len() || old.iter().zip(new).any(|(x, y)| outputs_differ(x, y))
}

fn outputs_differ(a: &Output, b: &Output) -> bool {
    match (a, b) {
        (Output::Stream { text: x, .. }, Output::Stream { text: y, .. }) => x != y,
        (Output::DisplayData { data: x, .. }, Output::DisplayData { data: y, .. }) => x != y,
        (Output::ExecuteResult { data: x, .. }, Output::ExecuteResult { data: y, .. }) => x != y,
        (Output::Error { evalue: x, .. }, Output::Error { evalue: y, .. }) => x != y,
        _ => true,
    }
}
