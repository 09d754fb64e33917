//! SQLite persistence for notebook actions.
//!
//! Append-only actions table, written in atomic batches by the write queue.
//! Connections are opened per operation and not held between flushes.

use rusqlite::types::Type;
use rusqlite::{Connection, Result as SqliteResult, Row, params};
use std::path::Path;

use indexmap::IndexMap;
use nbhist_diff::{ChangeSet, DocumentOrder};
use nbhist_types::{Block, BlockKey};

use crate::queue::QueueEntry;

/// Gap in activity that ends an editing session.
pub const SESSION_GAP_MS: i64 = 5 * 60 * 1000;

/// Database handle for action persistence.
pub struct ActionDb {
    conn: Connection,
}

/// A stored action, decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub time: i64,
    pub name: String,
    pub index: i64,
    pub selected: Vec<usize>,
    pub order: DocumentOrder,
    pub changes: ChangeSet,
}

/// Usage overview for a time range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivitySummary {
    /// Number of actions in the range.
    pub actions: usize,
    /// `delete-cell` actions.
    pub deletions: usize,
    /// Actions whose name starts with `run-cell`.
    pub runs: usize,
    /// Time spent editing, with gaps of [`SESSION_GAP_MS`] or more excluded.
    pub active_ms: i64,
}

const SCHEMA: &str = r#"
-- Actions (append-only, immutable)
CREATE TABLE IF NOT EXISTS actions (
    time INTEGER,
    name TEXT,
    cell_index INTEGER,
    selected_cells TEXT,
    cell_order TEXT,
    diff BLOB
);
CREATE INDEX IF NOT EXISTS idx_actions_time ON actions(time);
"#;

impl ActionDb {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert entries in order as one transaction.
    ///
    /// Either every entry is committed or none is.
    pub fn insert_batch(&mut self, entries: &[QueueEntry]) -> SqliteResult<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO actions (time, name, cell_index, selected_cells, cell_order, diff)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.time,
                    entry.name,
                    entry.index,
                    entry.selected_cells,
                    entry.cell_order,
                    entry.diff,
                ])?;
            }
        }
        tx.commit()?;
        Ok(entries.len())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Total number of stored actions.
    pub fn count(&self) -> SqliteResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM actions", [], |row| row.get(0))
    }

    /// Actions with `start <= time <= end`, in time then insertion order.
    pub fn actions_between(&self, start: i64, end: i64) -> SqliteResult<Vec<ActionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT time, name, cell_index, selected_cells, cell_order, diff
             FROM actions WHERE time BETWEEN ?1 AND ?2 ORDER BY time, rowid",
        )?;

        let rows = stmt.query_map(params![start, end], decode_row)?;
        rows.collect()
    }

    /// Names of all stored actions, in insertion order.
    pub fn action_names(&self) -> SqliteResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM actions ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }

    /// Summarize activity with `start <= time <= end`.
    pub fn activity_summary(&self, start: i64, end: i64) -> SqliteResult<ActivitySummary> {
        let mut stmt = self.conn.prepare(
            "SELECT time, name FROM actions WHERE time BETWEEN ?1 AND ?2 ORDER BY time, rowid",
        )?;
        let rows = stmt.query_map(params![start, end], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut summary = ActivitySummary::default();
        let mut times = Vec::new();
        for row in rows {
            let (time, name) = row?;
            summary.actions += 1;
            if name == "delete-cell" {
                summary.deletions += 1;
            }
            if name.starts_with("run-cell") {
                summary.runs += 1;
            }
            times.push(time);
        }
        summary.active_ms = active_time(&times);

        Ok(summary)
    }
}

/// Sum of session lengths in sorted timestamps, where a gap of
/// [`SESSION_GAP_MS`] or more starts a new session.
fn active_time(times: &[i64]) -> i64 {
    let Some((&first, rest)) = times.split_first() else {
        return 0;
    };

    let mut total = 0;
    let (mut start, mut last) = (first, first);
    for &t in rest {
        if t - last >= SESSION_GAP_MS {
            total += last - start;
            start = t;
        }
        last = t;
    }
    total + (last - start)
}

fn decode_row(row: &Row<'_>) -> SqliteResult<ActionRecord> {
    let selected: String = row.get(3)?;
    let order: String = row.get(4)?;
    let diff: Vec<u8> = row.get(5)?;

    let order: DocumentOrder =
        serde_json::from_str(&order).map_err(|e| conversion(4, Type::Text, e))?;
    let raw: IndexMap<String, Block> =
        serde_json::from_slice(&diff).map_err(|e| conversion(5, Type::Blob, e))?;

    Ok(ActionRecord {
        time: row.get(0)?,
        name: row.get(1)?,
        index: row.get(2)?,
        selected: serde_json::from_str(&selected).map_err(|e| conversion(3, Type::Text, e))?,
        changes: rekey(raw, &order),
        order,
    })
}

/// JSON object keys are always strings; positional change sets get their
/// integer keys back from the order's scheme.
fn rekey(raw: IndexMap<String, Block>, order: &DocumentOrder) -> ChangeSet {
    let positional = order.iter().any(|k| !k.is_id());
    raw.into_iter()
        .map(|(key, block)| {
            let key = match key.parse::<usize>() {
                Ok(index) if positional => BlockKey::Index(index),
                _ => BlockKey::Id(key),
            };
            (key, block)
        })
        .collect()
}

fn conversion(column: usize, ty: Type, e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, ty, Box::new(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(time: i64, name: &str) -> QueueEntry {
        QueueEntry {
            time,
            name: name.to_string(),
            index: 0,
            selected_cells: "[0]".to_string(),
            cell_order: "[0]".to_string(),
            diff: b"{}".to_vec(),
        }
    }

    #[test]
    fn test_batch_insert_keeps_order() {
        let mut db = ActionDb::in_memory().unwrap();

        let n = db
            .insert_batch(&[entry(3, "a"), entry(1, "b"), entry(2, "c")])
            .unwrap();

        assert_eq!(n, 3);
        assert_eq!(db.count().unwrap(), 3);
        assert_eq!(db.action_names().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_failed_batch_commits_nothing() {
        let mut db = ActionDb::in_memory().unwrap();
        db.conn
            .execute_batch(
                "CREATE TRIGGER reject BEFORE INSERT ON actions WHEN NEW.name = 'poison'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let result = db.insert_batch(&[entry(1, "ok"), entry(2, "poison"), entry(3, "ok")]);

        assert!(result.is_err());
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn test_actions_between_decodes() {
        let mut db = ActionDb::in_memory().unwrap();

        let mut changes = ChangeSet::new();
        changes.insert(BlockKey::from("c1"), Block::code("print(1)"));
        let stored = QueueEntry {
            time: 50,
            name: "run-cell".to_string(),
            index: 1,
            selected_cells: "[1,2]".to_string(),
            cell_order: r#"["c0","c1"]"#.to_string(),
            diff: serde_json::to_vec(&changes).unwrap(),
        };
        db.insert_batch(&[entry(10, "early"), stored, entry(100, "late")]).unwrap();

        let records = db.actions_between(20, 60).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.name, "run-cell");
        assert_eq!(record.index, 1);
        assert_eq!(record.selected, vec![1, 2]);
        assert_eq!(record.order, vec![BlockKey::from("c0"), BlockKey::from("c1")]);
        assert_eq!(record.changes, changes);

        // inclusive bounds
        assert_eq!(db.actions_between(10, 100).unwrap().len(), 3);
    }

    #[test]
    fn test_positional_keys_decode_as_indices() {
        let mut db = ActionDb::in_memory().unwrap();

        let mut changes = ChangeSet::new();
        changes.insert(BlockKey::Index(2), Block::code("y = 2"));
        let stored = QueueEntry {
            time: 1,
            name: "run-cell".to_string(),
            index: 2,
            selected_cells: "[2]".to_string(),
            cell_order: "[0,1,2]".to_string(),
            diff: serde_json::to_vec(&changes).unwrap(),
        };
        db.insert_batch(&[stored]).unwrap();

        let records = db.actions_between(0, 10).unwrap();
        assert_eq!(records[0].changes, changes);
        assert_eq!(records[0].order, vec![BlockKey::Index(0), BlockKey::Index(1), BlockKey::Index(2)]);
    }

    #[test]
    fn test_activity_summary() {
        let mut db = ActionDb::in_memory().unwrap();
        let minute = 60 * 1000;
        db.insert_batch(&[
            entry(0, "run-cell"),
            entry(minute, "delete-cell"),
            entry(2 * minute, "run-cell-and-select-next"),
            // six-minute gap starts a new session
            entry(8 * minute, "insert-cell-below"),
            entry(9 * minute, "run-all-cells"),
        ])
        .unwrap();

        let summary = db.activity_summary(0, 10 * minute).unwrap();
        assert_eq!(summary.actions, 5);
        assert_eq!(summary.deletions, 1);
        assert_eq!(summary.runs, 2);
        assert_eq!(summary.active_ms, 3 * minute);
    }

    #[test]
    fn test_active_time_edges() {
        assert_eq!(active_time(&[]), 0);
        assert_eq!(active_time(&[42]), 0);
        assert_eq!(active_time(&[0, SESSION_GAP_MS]), 0);
        assert_eq!(active_time(&[0, SESSION_GAP_MS - 1]), SESSION_GAP_MS - 1);
    }

    #[test]
    fn test_open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nb.db");
        {
            let mut db = ActionDb::open(&path).unwrap();
            db.insert_batch(&[entry(1, "run-cell")]).unwrap();
        }
        let db = ActionDb::open(&path).unwrap();
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn test_open_in_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ActionDb::open(dir.path().join("missing").join("nb.db")).is_err());
    }
}
