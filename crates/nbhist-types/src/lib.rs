//! Shared notebook and action types for nbhist.
//!
//! A pure leaf crate with **no internal nbhist dependencies**.
//!
//! # Key Types
//!
//! |-------------------|-----------------------------------------------|
//! | Type              | Purpose                                       |
//! |-------------------|-----------------------------------------------|
//! | [`Document`]      | Ordered blocks plus opaque notebook fields    |
//! | [`Block`]         | One cell: kind, source, metadata, outputs     |
//! | [`Output`]        | One code-cell output, tagged by type          |
//! | [`BlockKey`]      | Stable id or position of a block              |
//! | [`ActionEvent`]   | A user action and the document it produced    |
//! | [`Action`]        | Recognized frontend action names              |
//! | [`ActionClass`]   | What an action can change, for diffing        |
//! |-------------------|-----------------------------------------------|

pub mod action;
pub mod key;
pub mod notebook;

pub use action::{Action, ActionClass, ActionEvent};
pub use key::BlockKey;
pub use notebook::{Block, BlockKind, CELL_ID_KEY, Document, Output, OutputKind};
