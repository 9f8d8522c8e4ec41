//! Centralized filesystem paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! # Environment Overrides
//!
//! - `CONSOLIDATOR_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application config directory.
///
/// Holds `config.toml` and the cron job store.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("CONSOLIDATOR_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("consolidator"))
        .unwrap_or_else(|| PathBuf::from("/tmp/consolidator-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Cron job store path (`config_dir()/cron/jobs.json`).
#[must_use]
pub fn cron_store_file() -> PathBuf {
    config_dir().join("cron").join("jobs.json")
}
