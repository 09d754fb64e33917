//! Stable-identifier resolution.
//!
//! Two block sequences can be compared by identifier only when every block in
//! each sequence has one and no identifier repeats within its own sequence.
//! An id may appear in both sequences (that is the point) and the sequences
//! are checked independently.

use std::collections::HashSet;

use nbhist_types::Block;

/// Identifiers of one sequence, in order, if they are all present and unique.
pub fn sequence_ids(blocks: &[Block]) -> Option<Vec<String>> {
    let mut seen = HashSet::with_capacity(blocks.len());
    let mut ids = Vec::with_capacity(blocks.len());
    for block in blocks {
        let id = block.id()?;
        if !seen.insert(id.clone()) {
            return None;
        }
        ids.push(id);
    }
    Some(ids)
}

/// Identifiers of both sequences, when identity resolution succeeds.
pub fn resolve(prior: &[Block], current: &[Block]) -> Option<(Vec<String>, Vec<String>)> {
    let prior_ids = sequence_ids(prior)?;
    let current_ids = sequence_ids(current)?;
    Some((prior_ids, current_ids))
}

/// Whether `prior` and `current` can be diffed by identifier.
pub fn valid(prior: &[Block], current: &[Block]) -> bool {
    resolve(prior, current).is_some()
}
