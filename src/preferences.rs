//! Persisted user preferences: interface language and generative API key
//!
//! Stored as JSON in the user config directory:
//! - Linux: `~/.config/pilgrimage-overlay/preferences.json`
//! - macOS: `~/Library/Application Support/pilgrimage-overlay/preferences.json`
//! - Windows: `%APPDATA%/pilgrimage-overlay/preferences.json`

use crate::config::Language;
use crate::error::{OverlayError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the preferences directory
pub const CONFIG_DIR_ENV: &str = "PILGRIMAGE_OVERLAY_CONFIG_DIR";

const PREFERENCES_FILE: &str = "preferences.json";

/// Values that survive across sessions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Preferences {
    /// Stored key, ignoring blank values
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Store or clear the key; blank input clears it
    pub fn set_api_key(&mut self, key: Option<&str>) {
        self.api_key = key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string);
    }
}

/// JSON-file backed preference storage
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    /// Store in the default location, honouring [`CONFIG_DIR_ENV`]
    ///
    /// # Errors
    /// - No config directory could be determined
    pub fn new() -> Result<Self> {
        let dir = match std::env::var(CONFIG_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::config_dir()
                .ok_or_else(|| {
                    OverlayError::invalid_config(format!(
                        "Failed to determine config directory. Set {CONFIG_DIR_ENV}."
                    ))
                })?
                .join("pilgrimage-overlay"),
        };
        Ok(Self::in_dir(dir))
    }

    /// Store inside `dir` (created on first save)
    #[must_use]
    pub fn in_dir<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            path: dir.into().join(PREFERENCES_FILE),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read preferences; a missing file yields the defaults
    ///
    /// # Errors
    /// - File exists but cannot be read or parsed
    pub fn load(&self) -> Result<Preferences> {
        if !self.path.exists() {
            log::debug!("No preferences at {}, using defaults", self.path.display());
            return Ok(Preferences::default());
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| OverlayError::file_io_error("read preferences", &self.path, &e))?;
        serde_json::from_str(&contents).map_err(|e| {
            OverlayError::invalid_config(format!(
                "Invalid preferences file '{}': {e}",
                self.path.display()
            ))
        })
    }

    /// Write preferences, creating the directory when needed
    ///
    /// # Errors
    /// - Directory creation or write failure
    pub fn save(&self, preferences: &Preferences) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| OverlayError::file_io_error("create config directory", parent, &e))?;
        }
        let contents = serde_json::to_string_pretty(preferences)
            .map_err(|e| OverlayError::internal(format!("Failed to serialize preferences: {e}")))?;
        fs::write(&self.path, contents)
            .map_err(|e| OverlayError::file_io_error("write preferences", &self.path, &e))?;
        log::debug!("Saved preferences to {}", self.path.display());
        Ok(())
    }

    /// Load, modify and save in one step
    ///
    /// # Errors
    /// - See [`PreferenceStore::load`] and [`PreferenceStore::save`]
    pub fn update<F: FnOnce(&mut Preferences)>(&self, change: F) -> Result<Preferences> {
        let mut preferences = self.load()?;
        change(&mut preferences);
        self.save(&preferences)?;
        Ok(preferences)
    }
}
