//! Block keys.

use serde::{Deserialize, Serialize};

/// Address of a block within one diff computation.
///
/// Either the block's stable identifier or its position in the current
/// document. A single change set never mixes the two schemes.
///
/// Serialized untagged, so an order reads `["c1", "c2"]` or `[0, 1, 2]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockKey {
    /// Position in the current document.
    Index(usize),
    /// Stable identifier from block metadata.
    Id(String),
}

impl BlockKey {
    /// Check if this key is identifier-based.
    pub fn is_id(&self) -> bool {
        matches!(self, BlockKey::Id(_))
    }
}

impl From<usize> for BlockKey {
    fn from(index: usize) -> Self {
        BlockKey::Index(index)
    }
}

impl From<&str> for BlockKey {
    fn from(id: &str) -> Self {
        BlockKey::Id(id.to_string())
    }
}

impl From<String> for BlockKey {
    fn from(id: String) -> Self {
        BlockKey::Id(id)
    }
}

impl std::fmt::Display for BlockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockKey::Index(i) => write!(f, "#{}", i),
            BlockKey::Id(id) => write!(f, "{}", id),
        }
    }
}
