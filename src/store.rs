//! Persistence and lookup of snapshot files.
//!
//! The store directory is append-only: each run writes one new JSON file
//! named `scripts_info_<YYYYMMDDTHHMMSS>.json` and never touches older ones.
//! Lexicographic order over these names equals chronological order, so the
//! most recent snapshot is simply the greatest matching filename.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};
use tracing::debug;

use crate::snapshot::Snapshot;

/// Filename prefix shared by every snapshot in a store directory.
pub const SNAPSHOT_PREFIX: &str = "scripts_info_";
/// Filename extension shared by every snapshot in a store directory.
pub const SNAPSHOT_SUFFIX: &str = ".json";

const NAME_TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]");

/// Errors that may occur while loading or saving snapshots.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to create the store directory.
    #[error("Unable to create store directory {path}: {source}")]
    CreateDir {
        /// Directory that failed to create.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to read a snapshot file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to write a snapshot file.
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Path that failed to write.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Snapshot file content was not JSON of the expected shape.
    #[error("Invalid snapshot at {path}: {source}")]
    Parse {
        /// Snapshot file path.
        path: PathBuf,
        /// JSON parse error.
        source: serde_json::Error,
    },
    /// Failed to serialize a snapshot to JSON.
    #[error("Failed to serialize snapshot for {path}: {source}")]
    Serialize {
        /// Intended snapshot file path.
        path: PathBuf,
        /// JSON serialization error.
        source: serde_json::Error,
    },
    /// Failed to format the filename timestamp.
    #[error("Failed to format snapshot filename time: {0}")]
    FormatTime(time::error::Format),
}

/// Return the most recent snapshot file in `dir`, or `None` when there is
/// no usable history.
///
/// A missing directory and an empty one are deliberately indistinguishable:
/// both mean "first run".
pub fn find_latest(dir: &Path) -> Option<PathBuf> {
    let latest = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_snapshot_name(name))
        .max()?;
    Some(dir.join(latest))
}

fn is_snapshot_name(name: &str) -> bool {
    name.starts_with(SNAPSHOT_PREFIX) && name.ends_with(SNAPSHOT_SUFFIX)
}

/// Parse the snapshot stored at `path`.
pub fn load(path: &Path) -> Result<Snapshot, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Format the filename for a snapshot taken at `timestamp`.
pub fn snapshot_file_name(timestamp: OffsetDateTime) -> Result<String, time::error::Format> {
    let stamp = timestamp.format(NAME_TIMESTAMP_FORMAT)?;
    Ok(format!("{SNAPSHOT_PREFIX}{stamp}{SNAPSHOT_SUFFIX}"))
}

/// Persist `snapshot` into `dir` under a name derived from `timestamp`,
/// creating the directory if needed. Returns the written path.
pub fn save(
    dir: &Path,
    snapshot: &Snapshot,
    timestamp: OffsetDateTime,
) -> Result<PathBuf, StoreError> {
    fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let name = snapshot_file_name(timestamp).map_err(StoreError::FormatTime)?;
    let path = dir.join(name);
    let data = serde_json::to_vec_pretty(snapshot).map_err(|source| StoreError::Serialize {
        path: path.clone(),
        source,
    })?;
    atomic_write(&path, &data)?;
    debug!("Snapshot written to {}", path.display());
    Ok(path)
}

/// Write through a temp file in the same directory, then rename into place,
/// so a failed run never leaves a readable half-written snapshot.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    use rand::TryRngCore;

    let write_err = |source: std::io::Error| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = path
        .parent()
        .ok_or_else(|| write_err(std::io::Error::other("snapshot path has no parent")))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| write_err(std::io::Error::other("snapshot path has no file name")))?;

    let mut suffix_bytes = [0u8; 6];
    rand::rngs::OsRng
        .try_fill_bytes(&mut suffix_bytes)
        .map_err(|err| write_err(std::io::Error::other(err.to_string())))?;
    let suffix: String = suffix_bytes.iter().map(|b| format!("{b:02x}")).collect();
    let tmp_path = dir.join(format!("{}.tmp-{suffix}", file_name.to_string_lossy()));

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp_path)
        .map_err(write_err)?;
    let written = file.write_all(data).and_then(|_| file.sync_all());
    drop(file);
    if let Err(source) = written.and_then(|_| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(write_err(source));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{FileRecord, FileState};
    use tempfile::tempdir;

    fn sample_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "a.txt".to_string(),
            FileRecord {
                hash: "aa".to_string(),
                modify: "2024-01-01 00:00:00".to_string(),
                state: FileState::New,
            },
        );
        snapshot.insert(
            "b.txt".to_string(),
            FileRecord {
                hash: "bb".to_string(),
                modify: "2024-01-02 00:00:00".to_string(),
                state: FileState::Changed,
            },
        );
        snapshot
    }

    fn fixed_timestamp() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn file_name_is_sortable_timestamp() {
        let name = snapshot_file_name(fixed_timestamp()).unwrap();
        assert_eq!(name, "scripts_info_20231114T221320.json");
    }

    #[test]
    fn find_latest_picks_greatest_name() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("scripts_info_20240101T000000.json"), "{}").unwrap();
        fs::write(dir.path().join("scripts_info_20240102T000000.json"), "{}").unwrap();

        let latest = find_latest(dir.path()).unwrap();
        assert_eq!(
            latest,
            dir.path().join("scripts_info_20240102T000000.json")
        );
    }

    #[test]
    fn find_latest_ignores_unrelated_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::write(dir.path().join("scripts_info_20240101T000000.bak"), "").unwrap();
        assert!(find_latest(dir.path()).is_none());

        fs::write(dir.path().join("scripts_info_20240101T000000.json"), "{}").unwrap();
        assert!(find_latest(dir.path()).is_some());
    }

    #[test]
    fn find_latest_treats_missing_dir_as_no_history() {
        let dir = tempdir().unwrap();
        assert!(find_latest(&dir.path().join("never_created")).is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let snapshot = sample_snapshot();
        let path = save(dir.path(), &snapshot, fixed_timestamp()).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn save_creates_missing_store_directory() {
        let dir = tempdir().unwrap();
        let store_dir = dir.path().join("records/nested");
        let path = save(&store_dir, &sample_snapshot(), fixed_timestamp()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn save_leaves_no_temp_files_behind() {
        let dir = tempdir().unwrap();
        save(dir.path(), &sample_snapshot(), fixed_timestamp()).unwrap();
        let count = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 1);
    }

    #[test]
    fn load_rejects_malformed_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scripts_info_20240101T000000.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(load(&path), Err(StoreError::Parse { .. })));
    }

    #[test]
    fn load_fails_on_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scripts_info_20240101T000000.json");
        assert!(matches!(load(&path), Err(StoreError::Read { .. })));
    }
}
