//! Orchestration of a single snapshot run.
//!
//! Per-file failures never reach this level; the builder contains them. What
//! arrives here is the fatal-vs-continue decision: unreadable history is
//! recovered as an empty snapshot, while a failure to persist ends the run.

use std::path::PathBuf;

use tracing::{error, info};

use crate::config::RunConfig;
use crate::interrupt::{InterruptFlag, Interrupted};
use crate::logging;
use crate::snapshot::{self, FileState, Snapshot};
use crate::store::{self, StoreError};

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The new snapshot could not be persisted.
    #[error("Failed to persist snapshot: {0}")]
    Persist(#[from] StoreError),
    /// The operator cancelled the run.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct RunSummary {
    /// Path of the snapshot file written by this run.
    pub snapshot_path: PathBuf,
    /// Files absent from the previous snapshot.
    pub new: usize,
    /// Files whose content hash differs from the previous snapshot.
    pub changed: usize,
    /// Files with an identical content hash.
    pub unchanged: usize,
}

/// Execute one snapshot run: fingerprint the configured files, classify them
/// against the most recent stored snapshot, and persist the result.
pub fn run(config: &RunConfig, interrupt: &InterruptFlag) -> Result<RunSummary, RunError> {
    interrupt.check()?;
    let current = snapshot::build_snapshot(&config.files, interrupt)?;
    let previous = load_previous(config);
    let classified = snapshot::classify(&previous, current);

    interrupt.check()?;
    let snapshot_path = store::save(&config.records_folder, &classified, logging::now_local_or_utc())?;

    let summary = RunSummary {
        snapshot_path,
        new: classified.count_state(FileState::New),
        changed: classified.count_state(FileState::Changed),
        unchanged: classified.count_state(FileState::Unchanged),
    };
    info!(
        "Snapshot written to {}: {} new, {} changed, {} unchanged",
        summary.snapshot_path.display(),
        summary.new,
        summary.changed,
        summary.unchanged
    );
    Ok(summary)
}

/// Load the most recent stored snapshot, treating any failure as absent
/// history.
fn load_previous(config: &RunConfig) -> Snapshot {
    let Some(path) = store::find_latest(&config.records_folder) else {
        info!("No previous records found; this looks like the first run");
        return Snapshot::new();
    };
    match store::load(&path) {
        Ok(previous) => {
            info!("Previous records loaded from {}", path.display());
            previous
        }
        Err(err) => {
            error!("Unable to read previous records: {err}");
            Snapshot::new()
        }
    }
}
