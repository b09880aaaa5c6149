//! Snapshot data model, construction, and change classification.
//!
//! A snapshot maps each tracked path to the digest and modification time
//! observed during one run. Paths are stored exactly as configured; the
//! BTreeMap keeps serialized output deterministically key-sorted.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::fingerprint::{self, Fingerprint};
use crate::interrupt::{InterruptFlag, Interrupted};

/// Classification of a file relative to the previous snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    /// Not present in the previous snapshot.
    #[default]
    New,
    /// Present before with a different content hash.
    Changed,
    /// Present before with the same content hash.
    Unchanged,
}

/// One file's recorded state. Field names are the on-disk contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Lowercase hex MD5 digest of the file content.
    pub hash: String,
    /// Last modification time, `YYYY-MM-DD HH:MM:SS`, local time.
    pub modify: String,
    /// Classification relative to the previous snapshot.
    #[serde(default)]
    pub state: FileState,
}

impl From<Fingerprint> for FileRecord {
    fn from(print: Fingerprint) -> Self {
        Self {
            hash: print.hash,
            modify: print.modify,
            state: FileState::New,
        }
    }
}

/// A point-in-time record of all tracked files, keyed by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, FileRecord>);

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any previous entry for the same path.
    pub fn insert(&mut self, path: String, record: FileRecord) {
        self.0.insert(path, record);
    }

    /// Look up the record for a path.
    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.0.get(path)
    }

    /// Number of recorded files.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the snapshot holds no records.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over records in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileRecord)> {
        self.0.iter()
    }

    /// Count records carrying the given state.
    pub fn count_state(&self, state: FileState) -> usize {
        self.0.values().filter(|record| record.state == state).count()
    }
}

/// Fingerprint every path in `paths` and collect the results.
///
/// Missing or unreadable files are logged and skipped; one bad path never
/// aborts the run and leaves no entry behind. Duplicate paths collapse to
/// the last occurrence. The interrupt flag is checked between files.
pub fn build_snapshot(
    paths: &[String],
    interrupt: &InterruptFlag,
) -> Result<Snapshot, Interrupted> {
    let mut snapshot = Snapshot::new();
    for path in paths {
        interrupt.check()?;
        if !Path::new(path).exists() {
            error!("File '{path}' not found");
            continue;
        }
        match fingerprint::fingerprint(Path::new(path)) {
            Ok(print) => {
                let record = FileRecord::from(print);
                debug!(
                    "Current data for '{path}': hash={}, modify={}",
                    record.hash, record.modify
                );
                snapshot.insert(path.clone(), record);
            }
            Err(err) => {
                error!("Unable to fingerprint '{path}': {err}");
            }
        }
    }
    Ok(snapshot)
}

/// Fill in each record's state by comparing against the previous snapshot.
///
/// Hash equality is the sole criterion; the modification time never
/// participates. Files present only in `previous` leave no trace in the
/// result.
pub fn classify(previous: &Snapshot, current: Snapshot) -> Snapshot {
    let mut classified = Snapshot::new();
    for (path, mut record) in current.0 {
        record.state = match previous.get(&path) {
            None => FileState::New,
            Some(prev) if prev.hash != record.hash => FileState::Changed,
            Some(_) => FileState::Unchanged,
        };
        debug!("Final data for '{path}': state={:?}", record.state);
        classified.0.insert(path, record);
    }
    classified
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn record(hash: &str, modify: &str) -> FileRecord {
        FileRecord {
            hash: hash.to_string(),
            modify: modify.to_string(),
            state: FileState::New,
        }
    }

    fn snapshot_of(entries: &[(&str, FileRecord)]) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for (path, record) in entries {
            snapshot.insert(path.to_string(), record.clone());
        }
        snapshot
    }

    #[test]
    fn classify_marks_unknown_paths_new() {
        let previous = Snapshot::new();
        let current = snapshot_of(&[("a.txt", record("aa", "2024-01-01 00:00:00"))]);
        let classified = classify(&previous, current);
        assert_eq!(classified.get("a.txt").unwrap().state, FileState::New);
    }

    #[test]
    fn classify_marks_hash_mismatch_changed() {
        let previous = snapshot_of(&[("a.txt", record("aa", "2024-01-01 00:00:00"))]);
        let current = snapshot_of(&[("a.txt", record("bb", "2024-01-02 00:00:00"))]);
        let classified = classify(&previous, current);
        assert_eq!(classified.get("a.txt").unwrap().state, FileState::Changed);
    }

    #[test]
    fn classify_trusts_hash_over_modify_time() {
        let previous = snapshot_of(&[("a.txt", record("aa", "2024-01-01 00:00:00"))]);
        let current = snapshot_of(&[("a.txt", record("aa", "2024-06-30 12:34:56"))]);
        let classified = classify(&previous, current);
        assert_eq!(classified.get("a.txt").unwrap().state, FileState::Unchanged);
    }

    #[test]
    fn classify_ignores_entries_only_in_previous() {
        let previous = snapshot_of(&[
            ("kept.txt", record("aa", "2024-01-01 00:00:00")),
            ("removed.txt", record("bb", "2024-01-01 00:00:00")),
        ]);
        let current = snapshot_of(&[("kept.txt", record("aa", "2024-01-02 00:00:00"))]);
        let classified = classify(&previous, current);
        assert_eq!(classified.len(), 1);
        assert!(classified.get("removed.txt").is_none());
    }

    #[test]
    fn identical_snapshots_classify_everything_unchanged() {
        let entries = [
            ("a.txt", record("aa", "2024-01-01 00:00:00")),
            ("b.txt", record("bb", "2024-01-01 00:00:00")),
        ];
        let previous = snapshot_of(&entries);
        let current = snapshot_of(&entries);
        let classified = classify(&previous, current);
        assert_eq!(classified.count_state(FileState::Unchanged), 2);
    }

    #[test]
    fn build_skips_missing_files_and_keeps_the_rest() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let c = dir.path().join("c.txt");
        fs::write(&a, "a").unwrap();
        fs::write(&c, "c").unwrap();
        let paths = vec![
            a.to_string_lossy().into_owned(),
            dir.path().join("b.txt").to_string_lossy().into_owned(),
            c.to_string_lossy().into_owned(),
        ];

        let snapshot = build_snapshot(&paths, &InterruptFlag::new()).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.get(&paths[0]).is_some());
        assert!(snapshot.get(&paths[1]).is_none());
        assert!(snapshot.get(&paths[2]).is_some());
    }

    #[test]
    fn build_collapses_duplicate_paths() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        fs::write(&a, "a").unwrap();
        let path = a.to_string_lossy().into_owned();

        let snapshot = build_snapshot(&[path.clone(), path], &InterruptFlag::new()).unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn build_stops_on_raised_interrupt() {
        let flag = InterruptFlag::new();
        flag.set();
        assert!(build_snapshot(&["anything".to_string()], &flag).is_err());
    }

    #[test]
    fn serialized_snapshot_is_key_sorted_with_contract_fields() {
        let snapshot = snapshot_of(&[
            ("zulu.txt", record("aa", "2024-01-01 00:00:00")),
            ("alpha.txt", record("bb", "2024-01-01 00:00:00")),
        ]);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.find("alpha.txt").unwrap() < json.find("zulu.txt").unwrap());
        assert!(json.contains("\"hash\""));
        assert!(json.contains("\"modify\""));
        assert!(json.contains("\"state\":\"new\""));
    }

    #[test]
    fn record_without_state_deserializes_as_new() {
        let json = r#"{"hash":"aa","modify":"2024-01-01 00:00:00"}"#;
        let record: FileRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.state, FileState::New);
    }
}
