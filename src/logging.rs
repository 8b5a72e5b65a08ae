//! Logging configuration for querydeck.
//!
//! Embedding UIs usually own the terminal or window, so the default sink is a
//! log file; the headless CLI logs to stderr instead.

use crate::error::{QueryDeckError, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initializes logging to `path`, creating parent directories as needed.
///
/// The file is truncated on every start. [`get_log_path`] is the usual
/// location.
pub fn init_file_logging(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            QueryDeckError::config(format!(
                "Could not create log directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    let log_file = File::create(path).map_err(|e| {
        QueryDeckError::config(format!("Could not create log file {}: {e}", path.display()))
    })?;

    // A subscriber installed earlier by the host wins
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .try_init();
    Ok(())
}

/// Initializes logging to stderr.
///
/// `verbose` lowers the default level to `debug`, which traces every poll
/// tick and page attempt. `RUST_LOG` still takes precedence.
pub fn init_stderr_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(std::io::stderr)
        .try_init();
}

/// Returns the path for the log file.
pub fn get_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("querydeck").join("querydeck.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("querydeck").join("querydeck.log");
    }

    std::env::temp_dir().join("querydeck.log")
}
