//! JSON-lines protocol spoken on stdin/stdout.
//!
//! One request per line:
//!
//! ```json
//! {"path": "/home/amy/analysis.ipynb", "action": {"time": 1700000000000, "name": "run-cell", "index": 0, "indices": [0], "model": {"cells": []}}}
//! ```
//!
//! One reply per request, in order: `{"hashed_nb_path": "1a2b3c4d/analysis.ipynb"}`
//! on success, `{"error": "..."}` otherwise. Blank lines are ignored.
//!
//! Requests are handled concurrently, so a notebook stuck on a busy database
//! does not hold up the others. Requests for the same notebook still apply in
//! the order they were read.

use std::path::PathBuf;

use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesOrdered, StreamExt};
use nbhist_kernel::HistoryTracker;
use nbhist_types::ActionEvent;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    pub path: PathBuf,
    pub action: ActionEvent,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Saved { hashed_nb_path: String },
    Failed { error: String },
}

/// Handle one request line.
pub async fn handle_line(tracker: &HistoryTracker, line: &str) -> Reply {
    let request: SaveRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "malformed request");
            return Reply::Failed {
                error: format!("malformed request: {}", e),
            };
        }
    };

    match tracker.save_changes(&request.path, request.action).await {
        Ok(receipt) => Reply::Saved {
            hashed_nb_path: receipt.hashed_nb_path,
        },
        Err(e) => {
            tracing::error!(path = %request.path.display(), error = %e, "failed to save changes");
            Reply::Failed {
                error: e.to_string(),
            }
        }
    }
}

/// Answer requests until `reader` hits EOF and every reply is written.
/// Returns the number handled.
pub async fn serve<R, W>(tracker: &HistoryTracker, reader: R, mut writer: W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut in_flight: FuturesOrdered<BoxFuture<'_, Reply>> = FuturesOrdered::new();
    let mut eof = false;
    let mut handled = 0;

    loop {
        tokio::select! {
            biased;

            Some(reply) = in_flight.next(), if !in_flight.is_empty() => {
                let mut out = serde_json::to_vec(&reply)?;
                out.push(b'\n');
                writer.write_all(&out).await?;
                writer.flush().await?;
                handled += 1;
            }

            line = lines.next_line(), if !eof => match line? {
                Some(line) => {
                    let line = line.trim().to_string();
                    if !line.is_empty() {
                        in_flight.push_back(async move { handle_line(tracker, &line).await }.boxed());
                    }
                }
                None => eof = true,
            },

            else => break,
        }
    }

    Ok(handled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbhist_kernel::{ActionDb, HistoryConfig};

    fn tracker(dir: &std::path::Path) -> HistoryTracker {
        let mut config = HistoryConfig::default().with_data_directory(dir);
        config.flush_delay_ms = 60_000;
        HistoryTracker::new(config)
    }

    #[tokio::test]
    async fn test_serve_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(dir.path());

        let input = concat!(
            r#"{"path": "/w/nb.ipynb", "action": {"time": 1, "name": "run-cell", "index": 0, "indices": [0], "model": {"cells": [{"cell_type": "code", "source": ["x = 1"], "metadata": {}, "outputs": []}]}}}"#,
            "\n\n",
            "not json\n",
            r#"{"path": "/w/nb.ipynb", "action": {"time": 2, "name": "notebook-closed", "model": {"cells": []}}}"#,
            "\n",
        );
        let mut output = Vec::new();

        let handled = serve(&tracker, input.as_bytes(), &mut output).await.unwrap();
        assert_eq!(handled, 3);

        let replies: Vec<serde_json::Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let hashed = tracker.locate(std::path::Path::new("/w/nb.ipynb")).hashed_notebook_path();
        assert_eq!(replies[0]["hashed_nb_path"], hashed.as_str());
        assert!(replies[1]["error"].as_str().unwrap().starts_with("malformed request"));
        assert_eq!(replies[2]["hashed_nb_path"], hashed.as_str());

        // notebook-closed flushed both actions
        let db = ActionDb::open(tracker.locate(std::path::Path::new("/w/nb.ipynb")).db_path).unwrap();
        assert_eq!(db.count().unwrap(), 2);
    }

    fn run_cell_line(path: &str, time: i64, source: &str) -> String {
        serde_json::json!({
            "path": path,
            "action": {
                "time": time,
                "name": "run-cell",
                "index": 0,
                "indices": [0],
                "model": {"cells": [{"cell_type": "code", "source": [source], "metadata": {}, "outputs": []}]},
            },
        })
        .to_string()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_notebook_does_not_hold_up_others() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = std::sync::Arc::new(tracker(dir.path()));
        let a = tracker.locate(std::path::Path::new("/w/a.ipynb"));
        let b = tracker.locate(std::path::Path::new("/w/b.ipynb"));

        // another process holds a's database
        a.ensure_dirs().unwrap();
        let holder = rusqlite::Connection::open(&a.db_path).unwrap();
        holder.execute_batch("BEGIN EXCLUSIVE;").unwrap();

        let input = format!(
            "{}\n{}\n",
            r#"{"path": "/w/a.ipynb", "action": {"time": 1, "name": "notebook-closed", "model": {"cells": []}}}"#,
            run_cell_line("/w/b.ipynb", 2, "y = 2"),
        );
        let task = {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                let mut out = Vec::new();
                let handled = serve(&tracker, std::io::Cursor::new(input.into_bytes()), &mut out)
                    .await
                    .unwrap();
                (handled, out)
            })
        };

        let mut waited = 0;
        while !b.canonical_path.exists() && waited < 2_000 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            waited += 20;
        }
        assert!(b.canonical_path.exists(), "b was held up behind a");
        assert!(!task.is_finished(), "a should still be waiting on its database");

        drop(holder);
        let (handled, out) = task.await.unwrap();
        assert_eq!(handled, 2);

        let replies: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies[0]["hashed_nb_path"], a.hashed_notebook_path().as_str());
        assert_eq!(replies[1]["hashed_nb_path"], b.hashed_notebook_path().as_str());

        let db = ActionDb::open(&a.db_path).unwrap();
        assert_eq!(db.count().unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_notebook_keeps_request_order() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(dir.path());

        let input: String = (0..20)
            .map(|i| run_cell_line("/w/nb.ipynb", i, &format!("x = {}", i)) + "\n")
            .collect();
        let mut output = Vec::new();

        let handled = serve(&tracker, input.as_bytes(), &mut output).await.unwrap();
        assert_eq!(handled, 20);
        assert!(tracker.shutdown().await.is_empty());

        let db = ActionDb::open(tracker.locate(std::path::Path::new("/w/nb.ipynb")).db_path).unwrap();
        let times: Vec<i64> = db
            .actions_between(0, i64::MAX)
            .unwrap()
            .iter()
            .map(|r| r.time)
            .collect();
        assert_eq!(times, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_reply_shapes() {
        let saved = Reply::Saved {
            hashed_nb_path: "abcd1234/nb.ipynb".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&saved).unwrap(),
            r#"{"hashed_nb_path":"abcd1234/nb.ipynb"}"#
        );

        let failed = Reply::Failed {
            error: "nope".to_string(),
        };
        assert_eq!(serde_json::to_string(&failed).unwrap(), r#"{"error":"nope"}"#);
    }
}
