//! Candidate positions for documents without stable block ids.
//!
//! Without ids the only way to line blocks up is by position, and a
//! positional comparison of the whole document would flag every block after
//! an insertion. Instead each [`ActionClass`] names the current-document
//! positions the action could have touched; only those are compared.
//!
//! Results may contain duplicates and positions past the end of the current
//! document. The diff engine skips both. Index arithmetic saturates, since
//! indices come straight from the frontend.

use nbhist_types::{ActionClass, ActionEvent, Block};

/// Candidate indices for an action event against the prior blocks.
pub fn candidates_for(event: &ActionEvent, prior: &[Block]) -> Vec<usize> {
    candidates(
        event.class(),
        event.index,
        &event.indices,
        prior,
        &event.model.cells,
    )
}

/// Candidate indices in `current` that may differ from `prior`.
///
/// `index` is the single selected block, `selection` all selected blocks. An
/// empty `selection` is treated as `[index]`.
pub fn candidates(
    class: ActionClass,
    index: usize,
    selection: &[usize],
    prior: &[Block],
    current: &[Block],
) -> Vec<usize> {
    let selection: &[usize] = if selection.is_empty() {
        std::slice::from_ref(&index)
    } else {
        selection
    };
    let first = selection.iter().copied().min().unwrap_or(index);
    let last = selection.iter().copied().max().unwrap_or(index);
    let inserted = current.len().saturating_sub(prior.len());

    match class {
        ActionClass::Selected => selection.to_vec(),
        ActionClass::SelectedAndNext => with_extra(selection, last.saturating_add(1)),
        ActionClass::InsertAbove => vec![first],
        ActionClass::InsertBelow => vec![last.saturating_add(1)],
        ActionClass::PasteAbove => (first..first.saturating_add(inserted)).collect(),
        ActionClass::PasteBelow => {
            let anchor = last.saturating_add(1);
            (anchor..anchor.saturating_add(inserted)).collect()
        }
        ActionClass::PasteReplace => {
            let count = (current.len() + selection.len()).saturating_sub(prior.len());
            (first..first.saturating_add(count)).collect()
        }
        ActionClass::MoveUp => {
            if index == 0 || first == 0 {
                Vec::new()
            } else {
                with_extra(selection, first - 1)
            }
        }
        ActionClass::MoveDown => {
            if last.saturating_add(1) < current.len() {
                with_extra(selection, last.saturating_add(1))
            } else {
                Vec::new()
            }
        }
        ActionClass::Focused => vec![index],
        ActionClass::Previous => vec![index.saturating_sub(1)],
        ActionClass::SelectionStart => vec![first],
        ActionClass::Split => vec![index, index.saturating_add(1)],
        ActionClass::WholeDocument => (0..current.len()).collect(),
        ActionClass::Above => (0..index.min(current.len())).collect(),
        ActionClass::Below => (index..current.len()).collect(),
        ActionClass::UndoDeletion => restored(prior, current),
        ActionClass::Untracked => Vec::new(),
    }
}

fn with_extra(selection: &[usize], extra: usize) -> Vec<usize> {
    let mut indices = selection.to_vec();
    indices.push(extra);
    indices
}

/// Blocks brought back by an undo: rescan from the top for the first position
/// whose source changed or that only exists in `current`, and take as many
/// positions as the document grew.
fn restored(prior: &[Block], current: &[Block]) -> Vec<usize> {
    let inserted = current.len().saturating_sub(prior.len());
    if inserted == 0 {
        return Vec::new();
    }

    let start = current
        .iter()
        .enumerate()
        .position(|(i, block)| prior.get(i).is_none_or(|p| p.source != block.source));

    match start {
        Some(start) => (start..start + inserted).collect(),
        None => Vec::new(),
    }
}
