//! Configuration types for jnote.
//!
//! This module provides the [`Config`] struct which stores the vault location
//! and the timing parameters of the synchronization layer. Configuration is
//! persisted as TOML (typically at `~/.config/jnote/config.toml` on Unix systems).
//!
//! # Key Configuration Fields
//!
//! - `vault_root`: Root directory of the note vault
//! - `index_path`: SQLite file for the index (in-memory when unset)
//! - `debounce_ms`: Quiet period before an edited note is written to disk
//! - `echo_tolerance_ms`: Window used to recognize our own writes in watcher events
//! - `watch`: Whether to start the filesystem watcher
//!
//! # Example
//!
//! ```ignore
//! use jnote_core::config::Config;
//! use std::path::PathBuf;
//!
//! let config = Config::new(PathBuf::from("/home/user/vault"));
//! assert_eq!(config.debounce().as_millis(), 2000);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{JnoteError, Result};
use crate::fs::FileSystem;

/// Default quiet period before an edited note is flushed.
pub const DEFAULT_DEBOUNCE_MS: u64 = 2000;

/// Default echo-suppression window.
pub const DEFAULT_ECHO_TOLERANCE_MS: u64 = 100;

/// `Config` represents the parts of jnote that the user can configure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory of the vault
    pub vault_root: PathBuf,

    /// SQLite database file for the index.
    /// When not set the index lives in memory and is rebuilt by the startup scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_path: Option<PathBuf>,

    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Echo tolerance in milliseconds
    #[serde(default = "default_echo_tolerance_ms")]
    pub echo_tolerance_ms: u64,

    /// Start the filesystem watcher on startup
    #[serde(default = "default_watch")]
    pub watch: bool,
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_echo_tolerance_ms() -> u64 {
    DEFAULT_ECHO_TOLERANCE_MS
}

fn default_watch() -> bool {
    true
}

impl Config {
    /// Create a new config for the given vault with default timings
    pub fn new(vault_root: PathBuf) -> Self {
        Self {
            vault_root,
            index_path: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            echo_tolerance_ms: DEFAULT_ECHO_TOLERANCE_MS,
            watch: true,
        }
    }

    /// Debounce delay as a `Duration`
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Echo tolerance in seconds, the unit used for modification times
    pub fn echo_tolerance_secs(&self) -> f64 {
        self.echo_tolerance_ms as f64 / 1000.0
    }

    /// Load config from a specific path.
    pub fn load_from<FS: FileSystem + ?Sized>(fs: &FS, path: &Path) -> Result<Self> {
        let contents = fs
            .read_to_string(path)
            .map_err(|e| JnoteError::FileRead {
                path: path.to_path_buf(),
                source: e,
            })?;

        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to<FS: FileSystem + ?Sized>(&self, fs: &FS, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs.create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs.write_file(path, &contents)
            .map_err(|e| JnoteError::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(())
    }

    /// Load config from a path, returning a default for `vault_root` if it cannot be read.
    pub fn load_from_or_default<FS: FileSystem + ?Sized>(
        fs: &FS,
        path: &Path,
        vault_root: PathBuf,
    ) -> Self {
        match Self::load_from(fs, path) {
            Ok(config) => config,
            Err(_) => Self::new(vault_root),
        }
    }

    /// Get the config file path (~/.config/jnote/config.toml)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("jnote").join("config.toml"))
    }

    /// Load config from default location, or return default if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            let contents = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&contents)?;
            return Ok(config);
        }

        Ok(Config::default())
    }

    /// Save config to default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or(JnoteError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        let vault_root = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("jnote-vault");
        Self::new(vault_root)
    }
}
