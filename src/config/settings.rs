//! Service settings.
//!
//! Settings are persisted as JSON in the service's config directory and
//! loaded at startup. Every field has a default so a missing file means a
//! stock configuration, not an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading or saving settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine a config directory for this platform")]
    NoConfigDir,

    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Top-level service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the SQLite database. Defaults to the platform data dir.
    pub database_path: Option<PathBuf>,
    /// Background sync settings.
    pub sync: SyncSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: None,
            sync: SyncSettings::default(),
        }
    }
}

impl Settings {
    /// Loads settings from the default config location, falling back to
    /// defaults when no file exists.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = Self::default_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Loads settings from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Saves settings to the default config location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::default_config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Resolves the database path, defaulting to the platform data dir.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }

        let dirs = directories::ProjectDirs::from("", "", "outpost")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().join("outpost.db"))
    }

    fn default_config_path() -> Result<PathBuf, ConfigError> {
        let dirs = directories::ProjectDirs::from("", "", "outpost")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("settings.json"))
    }
}

/// Background sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Scheduled sync interval in seconds.
    pub interval_secs: u64,
    /// Cap on messages processed per account per run.
    pub max_messages_per_run: usize,
    /// Listing window for an account's first sync, in days.
    pub lookback_days: i64,
    /// Deadline for one account's run, in seconds.
    pub account_deadline_secs: u64,
    /// How many accounts sync concurrently.
    pub max_concurrent_accounts: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            max_messages_per_run: 500,
            lookback_days: 90,
            account_deadline_secs: 180,
            max_concurrent_accounts: 4,
        }
    }
}
