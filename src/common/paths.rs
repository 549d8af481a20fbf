//! Configuration, log and artifact paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/ffm-tester/`
//! - macOS: `~/Library/Application Support/ffm-tester/`
//! - Windows: `%APPDATA%\ffm-tester\`

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::config::Environment;

/// Application directory name
const APP_NAME: &str = "ffm-tester";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}

/// Build the artifact path `{prefix}_{environment}_{YYYYmmdd_HHMMSS}.json`
pub fn artifact_path(
    dir: &Path,
    prefix: &str,
    environment: Environment,
    at: DateTime<Local>,
) -> PathBuf {
    dir.join(format!(
        "{}_{}_{}.json",
        prefix,
        environment,
        at.format("%Y%m%d_%H%M%S")
    ))
}

/// Ensure a directory exists, creating it if needed
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}
