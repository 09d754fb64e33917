//! Error types for change detection.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reading the prior document.
///
/// A missing canonical file is not an error: it is the baseline case and
/// yields `Ok(None)` from [`read_prior`](crate::read_prior).
#[derive(Error, Debug)]
pub enum DiffError {
    /// The canonical file exists but could not be read.
    #[error("failed to read prior document {path}: {source}")]
    ReadPrior {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The canonical file is not a valid notebook.
    #[error("prior document {path} is not a valid notebook: {source}")]
    CorruptPrior {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
