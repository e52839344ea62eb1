//! Path utilities for hostbridge
//!
//! XDG Base Directory locations for the config file and logs.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Application identifier for XDG directories
const APP_NAME: &str = "hostbridge";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory
///
/// Location: `$XDG_CONFIG_HOME/hostbridge` or `~/.config/hostbridge`
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(fallback_config_dir)
}

/// Get the main configuration file path
///
/// Location: `$XDG_CONFIG_HOME/hostbridge/config.toml`
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the state directory
///
/// Location: `$XDG_STATE_HOME/hostbridge` or `~/.local/state/hostbridge`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(fallback_state_dir)
}

/// Get the log directory
///
/// Location: `$XDG_STATE_HOME/hostbridge/log`
pub fn log_dir() -> PathBuf {
    state_dir().join("log")
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

// Fallback implementations when ProjectDirs is unavailable

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

fn fallback_config_dir() -> PathBuf {
    home_dir().join(".config").join(APP_NAME)
}

fn fallback_state_dir() -> PathBuf {
    home_dir().join(".local").join("state").join(APP_NAME)
}
