//! Path resolution for LockAI configuration and data directories.
//!
//! `LOCKAI_HOME` resolution order:
//! 1. `LOCKAI_HOME` environment variable (if set)
//! 2. `~/.config/lockai` (default)

use std::path::PathBuf;

/// Returns the LockAI home directory.
///
/// Checks `LOCKAI_HOME` env var first, falls back to `~/.config/lockai`.
///
/// # Panics
/// Panics if the home directory cannot be determined.
pub fn lockai_home() -> PathBuf {
    if let Ok(home) = std::env::var("LOCKAI_HOME") {
        return PathBuf::from(home);
    }

    dirs::home_dir()
        .map(|h| h.join(".config").join("lockai"))
        .expect("Could not determine home directory")
}

/// Returns the path to the config.toml file.
pub fn config_path() -> PathBuf {
    lockai_home().join("config.toml")
}

/// Returns the path to the chat sessions directory.
pub fn sessions_dir() -> PathBuf {
    lockai_home().join("sessions")
}

/// Returns the path to the paper records directory.
pub fn papers_dir() -> PathBuf {
    lockai_home().join("papers")
}
