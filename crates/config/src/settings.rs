// Engine settings
// Loaded from ~/.config/cellgraph/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Largest row count a sheet can have. References past it are rejected.
pub const MAX_ROWS: usize = 1_048_576;
/// Largest column count a sheet can have (A..XFD).
pub const MAX_COLS: usize = 16_384;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // History
    /// Undo entries kept per sheet. The oldest entry is evicted past this.
    #[serde(rename = "history.maxEntries")]
    pub history_max_entries: usize,

    // Sheet
    #[serde(rename = "sheet.defaultRows")]
    pub default_rows: usize,

    #[serde(rename = "sheet.defaultCols")]
    pub default_cols: usize,

    // Recalc
    #[serde(rename = "recalc.logReports")]
    pub log_recalc_reports: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history_max_entries: 100,
            default_rows: 1000,
            default_cols: 100,
            log_recalc_reports: true,
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cellgraph");
        config_dir.join("settings.json")
    }

    /// Load settings from the default path, falling back to defaults.
    ///
    /// A missing file is not an error. A file that cannot be read or parsed
    /// is logged and replaced by defaults.
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("{}; using default settings", e);
                Self::default()
            }
        }
    }

    /// Load settings from an explicit path.
    ///
    /// Lines starting with `//` are stripped before parsing so the file can
    /// carry comments.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        let settings: Settings =
            serde_json::from_str(&cleaned).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_max_entries == 0 {
            return Err(ConfigError::Invalid("history.maxEntries must be at least 1".into()));
        }
        if self.default_rows == 0 || self.default_cols == 0 {
            return Err(ConfigError::Invalid(
                "sheet.defaultRows and sheet.defaultCols must be at least 1".into(),
            ));
        }
        if self.default_rows > MAX_ROWS || self.default_cols > MAX_COLS {
            return Err(ConfigError::Invalid(format!(
                "sheet dimensions are limited to {} rows and {} columns",
                MAX_ROWS, MAX_COLS
            )));
        }
        Ok(())
    }
}
