//! SIGINT handling for clean cancellation.
//!
//! A run polls the flag at step boundaries rather than being killed mid-write.
//! The orchestrator turns a set flag into a logged, clean stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The operator cancelled the run.
#[derive(Debug, thiserror::Error)]
#[error("Run cancelled by operator")]
pub struct Interrupted;

/// Shared flag raised by the SIGINT handler.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    /// Create a flag that is not yet hooked to any signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook the flag to SIGINT; delivery of the signal raises it.
    pub fn register(&self) -> Result<(), std::io::Error> {
        signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&self.0)).map(|_| ())
    }

    /// Raise the flag without a signal.
    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Fail with [`Interrupted`] if cancellation was requested.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_set() { Err(Interrupted) } else { Ok(()) }
    }
}
