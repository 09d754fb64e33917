//! Canonical document writes and rate-limited dated snapshots.
//!
//! The canonical file always holds the latest document. Dated versions live in
//! `versions/` as `<stem>-YYYY-MM-DD-HH-MM-SS-ffffff.ipynb` and are written at
//! most once per quiescence interval.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use nbhist_diff::Diff;
use nbhist_types::Document;

use crate::error::HistoryError;
use crate::location::DocumentLocation;

/// Length of the timestamp suffix: `YYYY-MM-DD-HH-MM-SS-ffffff`.
const STAMP_LEN: usize = 26;

const EXTENSION: &str = ".ipynb";

/// What [`SnapshotScheduler::persist`] wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    /// Nothing changed; no file touched.
    Unchanged,
    /// Canonical file overwritten, no dated version.
    Canonical,
    /// Canonical file overwritten and a dated version written.
    Versioned(PathBuf),
}

/// Result of scanning a version directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionScan {
    /// Timestamp of the newest well-formed version.
    pub latest: Option<NaiveDateTime>,
    /// Files with the document's prefix whose timestamp did not parse.
    pub malformed: Vec<PathBuf>,
}

/// Decides which files to write after a diff.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotScheduler {
    interval: Duration,
    track_versions: bool,
}

impl SnapshotScheduler {
    pub fn new(interval: Duration, track_versions: bool) -> Self {
        Self {
            interval,
            track_versions,
        }
    }

    /// Write the canonical file when `diff` has changes or is a baseline,
    /// then a dated version when the newest one is older than the interval.
    ///
    /// `now` is local wall-clock time and only names the version file.
    pub fn persist(
        &self,
        location: &DocumentLocation,
        document: &Document,
        diff: &Diff,
        now: NaiveDateTime,
    ) -> Result<Persisted, HistoryError> {
        if diff.is_empty() && !diff.baseline && location.canonical_path.exists() {
            return Ok(Persisted::Unchanged);
        }

        let json = document.to_json_pretty()?;
        write_atomic(&location.canonical_path, json.as_bytes())?;

        if !self.track_versions {
            return Ok(Persisted::Canonical);
        }

        let scan = scan_versions(&location.version_dir, &location.stem)?;
        for path in &scan.malformed {
            tracing::warn!(path = %path.display(), "ignoring version file with malformed timestamp");
        }

        if !self.due(scan.latest, now) {
            return Ok(Persisted::Canonical);
        }

        std::fs::create_dir_all(&location.version_dir)?;
        let path = location
            .version_dir
            .join(version_file_name(&location.stem, now));
        write_atomic(&path, json.as_bytes())?;
        tracing::info!(path = %path.display(), "wrote dated version");

        Ok(Persisted::Versioned(path))
    }

    /// A version is due when none exists or the newest is strictly older
    /// than the interval. A newest version dated in the future counts as recent.
    fn due(&self, latest: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
        let Some(latest) = latest else {
            return true;
        };
        match (now - latest).to_std() {
            Ok(elapsed) => elapsed > self.interval,
            Err(_) => false,
        }
    }
}

/// `<stem>-YYYY-MM-DD-HH-MM-SS-ffffff.ipynb`
pub fn version_file_name(stem: &str, at: NaiveDateTime) -> String {
    format!(
        "{}-{}-{:06}{}",
        stem,
        at.format("%Y-%m-%d-%H-%M-%S"),
        at.nanosecond() % 1_000_000_000 / 1000,
        EXTENSION
    )
}

/// Parse `YYYY-MM-DD-HH-MM-SS-ffffff`.
pub fn parse_version_stamp(stamp: &str) -> Option<NaiveDateTime> {
    if stamp.len() != STAMP_LEN {
        return None;
    }

    let fields: Vec<u32> = stamp
        .split('-')
        .map(|f| {
            if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                f.parse().ok()
            }
        })
        .collect::<Option<_>>()?;

    let [year, month, day, hour, min, sec, micro] = fields[..] else {
        return None;
    };

    NaiveDate::from_ymd_opt(year as i32, month, day)?.and_hms_micro_opt(hour, min, sec, micro)
}

/// Find the newest dated version of `stem` in `dir`.
///
/// A missing directory is an empty scan. Files without the `<stem>-` prefix
/// and `.ipynb` extension belong to nobody and are skipped.
pub fn scan_versions(dir: &Path, stem: &str) -> std::io::Result<VersionScan> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(VersionScan::default()),
        Err(e) => return Err(e),
    };

    let prefix = format!("{}-", stem);
    let mut scan = VersionScan::default();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(stamp) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(EXTENSION))
        else {
            continue;
        };

        match parse_version_stamp(stamp) {
            Some(at) => {
                if scan.latest.is_none_or(|latest| at > latest) {
                    scan.latest = Some(at);
                }
            }
            None => scan.malformed.push(entry.path()),
        }
    }

    Ok(scan)
}

/// Write to a sibling temp file and rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}
