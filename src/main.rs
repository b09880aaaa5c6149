//! Command line entry point for the snapshot tool.
//!
//! Takes a single argument, the path to a JSON config file, and performs one
//! snapshot run: fingerprint the configured files, classify them against the
//! most recent stored snapshot, and persist the result.

use std::path::PathBuf;
use std::process::ExitCode;

use filesnap::config::{self, RunConfig};
use filesnap::interrupt::InterruptFlag;
use filesnap::logging;
use filesnap::run::{self, RunError};

fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = logging::init(&config.log_file) {
        eprintln!("File logging disabled: {err}");
    }

    let interrupt = InterruptFlag::new();
    if let Err(err) = interrupt.register() {
        tracing::warn!("Unable to install SIGINT handler: {err}");
    }

    match run::run(&config, &interrupt) {
        Ok(_) => ExitCode::SUCCESS,
        Err(RunError::Interrupted(_)) => {
            tracing::info!("Run cancelled by operator (Ctrl+C)");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("Run aborted: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Parse the command line and load the config.
///
/// This happens before logging exists, so failures are reported on stderr
/// only.
fn load_config() -> Result<RunConfig, String> {
    let mut args = std::env::args_os().skip(1);
    let Some(config_arg) = args.next() else {
        return Err(usage());
    };
    if config_arg == "-h" || config_arg == "--help" || args.next().is_some() {
        return Err(usage());
    }
    let config_path = PathBuf::from(config_arg);
    config::load(&config_path).map_err(|err| format!("Unable to load config: {err}"))
}

fn usage() -> String {
    "Usage: filesnap <config.json>".to_string()
}
