//! Notebook document model.
//!
//! A [`Document`] is the nbformat JSON a notebook frontend posts with every
//! action. Only the fields change detection needs are typed. Everything else
//! rides along in `extra` maps so a document read from disk is written back
//! without losing keys.
//!
//! ## Multiline strings
//!
//! nbformat stores `source`, stream `text`, and textual mime-bundle values
//! either as one string or as a list of line strings. Both forms deserialize
//! to the joined `String`, so a document posted by the frontend and the same
//! document read back from disk compare equal.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::EnumString;

/// Metadata key holding a block's stable identifier.
pub const CELL_ID_KEY: &str = "comet_cell_id";

/// An ordered sequence of blocks plus opaque notebook-level fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Blocks in display order.
    #[serde(default)]
    pub cells: Vec<Block>,
    /// `metadata`, `nbformat`, `nbformat_minor`, and anything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// Create a document from blocks, with no notebook-level fields.
    pub fn new(cells: Vec<Block>) -> Self {
        Self {
            cells,
            extra: Map::new(),
        }
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the document has no blocks.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Parse a document from nbformat JSON.
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Render the document as indented nbformat JSON.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// What a block *is*.
///
/// Serialized with nbformat's names; `text` is accepted as an alias for
/// markdown when parsing from a string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum BlockKind {
    /// Executable code; the only kind with outputs.
    #[default]
    Code,
    /// Prose (markdown).
    #[serde(rename = "markdown")]
    #[strum(serialize = "markdown", serialize = "text")]
    Text,
    /// Raw, unrendered content.
    Raw,
}

impl BlockKind {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to nbformat's string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Code => "code",
            BlockKind::Text => "markdown",
            BlockKind::Raw => "raw",
        }
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One notebook cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block type tag.
    pub cell_type: BlockKind,
    /// Source text, joined if stored as lines.
    #[serde(default, with = "multiline")]
    pub source: String,
    /// Cell metadata; carries [`CELL_ID_KEY`] when the frontend assigns ids.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Outputs of a code block. `None` for text and raw blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<Output>>,
    /// `execution_count`, `attachments`, and other passthrough fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Block {
    /// Create a block of the given kind. Code blocks start with no outputs.
    pub fn new(kind: BlockKind, source: impl Into<String>) -> Self {
        Self {
            cell_type: kind,
            source: source.into(),
            metadata: Map::new(),
            outputs: (kind == BlockKind::Code).then(Vec::new),
            extra: Map::new(),
        }
    }

    /// Create a code block.
    pub fn code(source: impl Into<String>) -> Self {
        Self::new(BlockKind::Code, source)
    }

    /// Create a markdown block.
    pub fn text(source: impl Into<String>) -> Self {
        Self::new(BlockKind::Text, source)
    }

    /// Create a raw block.
    pub fn raw(source: impl Into<String>) -> Self {
        Self::new(BlockKind::Raw, source)
    }

    /// Set the stable identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.metadata
            .insert(CELL_ID_KEY.to_string(), Value::String(id.into()));
        self
    }

    /// Replace the outputs.
    pub fn with_outputs(mut self, outputs: Vec<Output>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    /// The stable identifier, if one is present.
    ///
    /// String and numeric ids are accepted; numbers are rendered in decimal.
    /// Any other JSON value counts as missing.
    pub fn id(&self) -> Option<String> {
        match self.metadata.get(CELL_ID_KEY)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Outputs, empty for blocks that have none.
    pub fn outputs(&self) -> &[Output] {
        self.outputs.as_deref().unwrap_or(&[])
    }

    /// Check if this is a code block.
    pub fn is_code(&self) -> bool {
        self.cell_type == BlockKind::Code
    }
}

/// Type tag of an [`Output`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Stream,
    DisplayData,
    ExecuteResult,
    Error,
}

impl OutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::Stream => "stream",
            OutputKind::DisplayData => "display_data",
            OutputKind::ExecuteResult => "execute_result",
            OutputKind::Error => "error",
        }
    }
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One output of a code block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum Output {
    /// Text written to stdout/stderr.
    Stream {
        #[serde(default)]
        name: String,
        #[serde(with = "multiline")]
        text: String,
    },
    /// Rich display output.
    DisplayData {
        #[serde(default, with = "mime_bundle")]
        data: Map<String, Value>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    /// The value of the last expression in a cell.
    ExecuteResult {
        #[serde(default, with = "mime_bundle")]
        data: Map<String, Value>,
        #[serde(default)]
        metadata: Map<String, Value>,
        #[serde(default)]
        execution_count: Option<i64>,
    },
    /// A raised exception.
    Error {
        #[serde(default)]
        ename: String,
        #[serde(default)]
        evalue: String,
        #[serde(default)]
        traceback: Vec<String>,
    },
}

impl Output {
    /// Stdout stream output.
    pub fn stdout(text: impl Into<String>) -> Self {
        Output::Stream {
            name: "stdout".to_string(),
            text: text.into(),
        }
    }

    /// Execute result with a single `text/plain` representation.
    pub fn plain_result(text: impl Into<String>, execution_count: i64) -> Self {
        let mut data = Map::new();
        data.insert("text/plain".to_string(), Value::String(text.into()));
        Output::ExecuteResult {
            data,
            metadata: Map::new(),
            execution_count: Some(execution_count),
        }
    }

    /// Error output with no traceback.
    pub fn error(ename: impl Into<String>, evalue: impl Into<String>) -> Self {
        Output::Error {
            ename: ename.into(),
            evalue: evalue.into(),
            traceback: Vec::new(),
        }
    }

    /// The output's type tag.
    pub fn kind(&self) -> OutputKind {
        match self {
            Output::Stream { .. } => OutputKind::Stream,
            Output::DisplayData { .. } => OutputKind::DisplayData,
            Output::ExecuteResult { .. } => OutputKind::ExecuteResult,
            Output::Error { .. } => OutputKind::Error,
        }
    }
}

/// String-or-lines fields.
mod multiline {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Multiline {
        One(String),
        Lines(Vec<String>),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(match Multiline::deserialize(deserializer)? {
            Multiline::One(s) => s,
            Multiline::Lines(lines) => lines.concat(),
        })
    }

    pub fn serialize<S: Serializer>(value: &str, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value)
    }
}

/// Mime bundles: textual values stored as line lists are joined, JSON mime
/// types are left alone.
mod mime_bundle {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::{Map, Value};

    fn is_json_mime(mime: &str) -> bool {
        mime == "application/json" || mime.ends_with("+json")
    }

    fn join_lines(value: Value) -> Value {
        match value {
            Value::Array(items) if items.iter().all(Value::is_string) => Value::String(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<String>(),
            ),
            other => other,
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Map<String, Value>, D::Error> {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|(mime, value)| {
                if is_json_mime(&mime) {
                    (mime, value)
                } else {
                    (mime, join_lines(value))
                }
            })
            .collect())
    }

    pub fn serialize<S: Serializer>(
        value: &Map<String, Value>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }
}
