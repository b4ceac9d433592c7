//! Configuration loading and management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Overrides the data directory, mainly for tests and side-by-side installs
pub const DATA_DIR_ENV: &str = "DISPLAYSWITCH_DATA_DIR";

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding the store and the socket
    pub data_dir: PathBuf,

    /// Persisted displays and keybindings
    pub store_path: PathBuf,

    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::from_data_dir(dir));
        }

        let home = std::env::var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(home)
            .join("Library")
            .join("Application Support")
            .join("DisplaySwitch");

        Ok(Self::from_data_dir(data_dir))
    }

    /// Derive every path from one data directory
    pub fn from_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            store_path: data_dir.join("store.json"),
            socket_path: data_dir.join("daemon.sock"),
            data_dir,
        }
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}
