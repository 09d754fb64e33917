//! Storage locations for a tracked notebook.
//!
//! Each notebook gets its own directory under the data root, named by a short
//! hash of the notebook's directory plus the notebook's file stem, so two
//! `Untitled.ipynb` files in different folders never share history:
//!
//! ```text
//! <data>/<dirhash>/<stem>/<stem>.ipynb      canonical document
//! <data>/<dirhash>/<stem>/<stem>.db         actions database
//! <data>/<dirhash>/<stem>/versions/         dated snapshots
//! ```

use std::path::{Path, PathBuf};

/// Fixed namespace for deriving directory hashes via UUIDv5.
const NBHIST_PATH_NS: uuid::Uuid = uuid::uuid!("5c0e7a1d-3b92-4f6e-8d14-a27f09c6b3e8");

/// Name of the dated-snapshot subdirectory.
pub const VERSIONS_DIR: &str = "versions";

/// Stable identity of a tracked notebook: `"<dirhash>/<stem>"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn new(dir_hash: &str, stem: &str) -> Self {
        Self(format!("{}/{}", dir_hash, stem))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short, stable hash of a directory path (8 hex digits).
///
/// Same input always produces the same output (UUIDv5 deterministic hash).
pub fn hash_dir(dir: &Path) -> String {
    let uuid = uuid::Uuid::new_v5(&NBHIST_PATH_NS, dir.to_string_lossy().as_bytes());
    let mut hex = uuid.simple().to_string();
    hex.truncate(8);
    hex
}

/// Every path derived for one notebook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentLocation {
    /// Registry key.
    pub key: DocumentKey,
    /// Hash of the notebook's directory.
    pub dir_hash: String,
    /// Notebook file stem (`analysis` for `analysis.ipynb`).
    pub stem: String,
    /// Notebook extension including the dot, empty if none.
    pub extension: String,
    /// Per-notebook storage directory.
    pub dest_dir: PathBuf,
    /// Canonical document, overwritten on change.
    pub canonical_path: PathBuf,
    /// Directory of dated snapshots.
    pub version_dir: PathBuf,
    /// Actions database.
    pub db_path: PathBuf,
}

impl DocumentLocation {
    /// Derive storage paths for the notebook at `notebook_path`.
    pub fn resolve(data_dir: &Path, notebook_path: &Path) -> Self {
        let dir = notebook_path.parent().unwrap_or_else(|| Path::new(""));
        let stem = notebook_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = notebook_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let dir_hash = hash_dir(dir);

        let dest_dir = data_dir.join(&dir_hash).join(&stem);
        Self {
            key: DocumentKey::new(&dir_hash, &stem),
            canonical_path: dest_dir.join(format!("{}.ipynb", stem)),
            version_dir: dest_dir.join(VERSIONS_DIR),
            db_path: dest_dir.join(format!("{}.db", stem)),
            dest_dir,
            dir_hash,
            stem,
            extension,
        }
    }

    /// Create the storage and version directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.version_dir)
    }

    /// The notebook's path relative to the data root, hashed:
    /// `"<dirhash>/<stem><ext>"`.
    pub fn hashed_notebook_path(&self) -> String {
        format!("{}/{}{}", self.dir_hash, self.stem, self.extension)
    }
}
