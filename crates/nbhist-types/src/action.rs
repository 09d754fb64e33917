//! Action events and action classes.
//!
//! Frontends name actions with kebab-case strings (`run-cell`,
//! `paste-cell-below`, ...). [`Action`] is the closed set of names the
//! tracker understands; each maps onto exactly one [`ActionClass`], which is
//! what change detection dispatches on. Names outside the set are
//! [`ActionClass::Untracked`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use crate::notebook::Document;

/// One user-initiated operation and the document it produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// When the action happened, Unix milliseconds.
    pub time: i64,
    /// Frontend action name.
    pub name: String,
    /// The single selected (focused) block index.
    #[serde(default)]
    pub index: usize,
    /// All selected block indices.
    #[serde(default)]
    pub indices: Vec<usize>,
    /// The full document after the action.
    pub model: Document,
}

impl ActionEvent {
    /// Create an event selecting a single block.
    pub fn new(time: i64, name: impl Into<String>, index: usize, model: Document) -> Self {
        Self {
            time,
            name: name.into(),
            index,
            indices: vec![index],
            model,
        }
    }

    /// Replace the selected indices.
    pub fn with_indices(mut self, indices: Vec<usize>) -> Self {
        self.indices = indices;
        self
    }

    /// The recognized action, if the name is known.
    pub fn action(&self) -> Option<Action> {
        Action::from_str(&self.name)
    }

    /// The behavior class used for change detection.
    pub fn class(&self) -> ActionClass {
        self.action().map(|a| a.class()).unwrap_or(ActionClass::Untracked)
    }

    /// Selected indices, falling back to the single selected index when the
    /// frontend sent an empty selection.
    pub fn selection(&self) -> Vec<usize> {
        if self.indices.is_empty() {
            vec![self.index]
        } else {
            self.indices.clone()
        }
    }

    /// Whether this action may be dropped when it changed nothing.
    pub fn is_suppressible(&self) -> bool {
        self.action().is_some_and(|a| a.is_unselect())
    }

    /// Whether this action ends the editing session.
    pub fn ends_session(&self) -> bool {
        self.action() == Some(Action::NotebookClosed)
    }
}

/// Frontend action names the tracker understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Action {
    RunCell,
    ClearCellOutput,
    ChangeCellToMarkdown,
    ChangeCellToCode,
    ChangeCellToRaw,
    ToggleCellOutputCollapsed,
    ToggleCellOutputScrolled,
    RunCellAndInsertBelow,
    RunCellAndSelectNext,
    InsertCellAbove,
    InsertCellBelow,
    PasteCellAbove,
    PasteCellBelow,
    PasteCellReplace,
    MoveCellUp,
    MoveCellDown,
    MergeCellWithNextCell,
    MergeCellWithPreviousCell,
    MergeSelectedCells,
    MergeCells,
    SplitCellAtCursor,
    UnselectCell,
    RunAllCells,
    RestartKernelAndClearOutput,
    ConfirmRestartKernelAndRunAllCells,
    RunAllCellsAbove,
    RunAllCellsBelow,
    UndoCellDeletion,
    DeleteCell,
    CutCell,
    CopyCell,
    SaveNotebook,
    NotebookOpened,
    NotebookClosed,
}

impl Action {
    /// Parse a frontend action name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// The frontend name.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Change-detection class.
    pub fn class(&self) -> ActionClass {
        match self {
            Action::RunCell
            | Action::ClearCellOutput
            | Action::ChangeCellToMarkdown
            | Action::ChangeCellToCode
            | Action::ChangeCellToRaw
            | Action::ToggleCellOutputCollapsed
            | Action::ToggleCellOutputScrolled => ActionClass::Selected,
            Action::RunCellAndInsertBelow | Action::RunCellAndSelectNext => {
                ActionClass::SelectedAndNext
            }
            Action::InsertCellAbove => ActionClass::InsertAbove,
            Action::InsertCellBelow => ActionClass::InsertBelow,
            Action::PasteCellAbove => ActionClass::PasteAbove,
            Action::PasteCellBelow => ActionClass::PasteBelow,
            Action::PasteCellReplace => ActionClass::PasteReplace,
            Action::MoveCellUp => ActionClass::MoveUp,
            Action::MoveCellDown => ActionClass::MoveDown,
            Action::MergeCellWithNextCell | Action::UnselectCell => ActionClass::Focused,
            Action::MergeCellWithPreviousCell => ActionClass::Previous,
            Action::MergeSelectedCells | Action::MergeCells => ActionClass::SelectionStart,
            Action::SplitCellAtCursor => ActionClass::Split,
            Action::RunAllCells
            | Action::RestartKernelAndClearOutput
            | Action::ConfirmRestartKernelAndRunAllCells => ActionClass::WholeDocument,
            Action::RunAllCellsAbove => ActionClass::Above,
            Action::RunAllCellsBelow => ActionClass::Below,
            Action::UndoCellDeletion => ActionClass::UndoDeletion,
            Action::DeleteCell
            | Action::CutCell
            | Action::CopyCell
            | Action::SaveNotebook
            | Action::NotebookOpened
            | Action::NotebookClosed => ActionClass::Untracked,
        }
    }

    /// Selection-only changes, recorded only when they changed a block.
    pub fn is_unselect(&self) -> bool {
        matches!(self, Action::UnselectCell)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an action can change a document that lacks stable block ids.
///
/// Each variant names which current-document positions may differ from the
/// prior document after the action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionClass {
    /// Exactly the selected blocks.
    Selected,
    /// The selected blocks and the one after the last of them.
    SelectedAndNext,
    /// A new block at the first selected position.
    InsertAbove,
    /// A new block after the last selected position.
    InsertBelow,
    /// Pasted blocks starting at the first selected position.
    PasteAbove,
    /// Pasted blocks starting after the last selected position.
    PasteBelow,
    /// Pasted blocks replacing the selection.
    PasteReplace,
    /// The selection and the block it swapped with, above.
    MoveUp,
    /// The selection and the block it swapped with, below.
    MoveDown,
    /// The single selected block.
    Focused,
    /// The block before the single selected one.
    Previous,
    /// The first selected block.
    SelectionStart,
    /// The selected block and the new block after it.
    Split,
    /// Every block.
    WholeDocument,
    /// Every block before the selected one.
    Above,
    /// The selected block and every block after it.
    Below,
    /// Restored blocks, wherever they reappeared.
    UndoDeletion,
    /// Nothing to check.
    Untracked,
}
