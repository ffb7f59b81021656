//! Path utilities for Snapguard data directories

use std::path::PathBuf;
use std::sync::OnceLock;

/// Global storage for custom data directory path
static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Environment variable that overrides the default data directory.
pub const DATA_DIR_ENV: &str = "SNAPGUARD_HOME";

/// Initialize the data directory with an optional custom path.
/// Must be called early in main() before any other path functions are used.
/// If custom_path is None, falls back to `$SNAPGUARD_HOME`, then ~/.snapguard.
pub fn init_data_dir(custom_path: Option<PathBuf>) {
    let path = custom_path
        .or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(default_data_dir);
    if DATA_DIR.set(path.clone()).is_err() {
        let existing = DATA_DIR
            .get()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        tracing::debug!(
            path = %path.display(),
            existing = %existing,
            "Data directory already initialized"
        );
    }
}

/// Get the default data directory path (~/.snapguard)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".snapguard"))
        .unwrap_or_else(|| PathBuf::from(".snapguard"))
}

/// Get the base Snapguard data directory.
/// Returns the custom path if set via init_data_dir(), otherwise ~/.snapguard
pub fn data_dir() -> PathBuf {
    DATA_DIR.get().cloned().unwrap_or_else(default_data_dir)
}

/// Get the logs directory (~/.snapguard/logs)
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Get the default log file path (~/.snapguard/logs/snapguard.log)
pub fn log_file_path() -> PathBuf {
    logs_dir().join("snapguard.log")
}

/// Name of the per-deployment config file (`<root>/snapguard.toml`)
pub const DEPLOYMENT_CONFIG_FILE: &str = "snapguard.toml";
