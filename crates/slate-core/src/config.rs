use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Defaults applied when the config file is absent or a field is unset.
const DEFAULT_DEBOUNCE_MS: u64 = 400;
const DEFAULT_REMINDER_DAYS: u32 = 7;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Override for the directory holding the database and fallback files.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Autosave quiescence window in milliseconds.
    #[serde(default)]
    pub autosave_debounce_ms: Option<u64>,

    /// Days without an export before the backup reminder fires.
    #[serde(default)]
    pub backup_reminder_days: Option<u32>,
}

impl AppConfig {
    pub fn config_path() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            dirs::home_dir().map(|home| home.join(".config/slate/config.toml"))
        }
        #[cfg(target_os = "linux")]
        {
            dirs::config_dir().map(|config| config.join("slate/config.toml"))
        }
        #[cfg(target_os = "windows")]
        {
            dirs::config_dir().map(|config| config.join("slate\\config.toml"))
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            None
        }
    }

    pub fn load() -> Self {
        if let Some(config_path) = Self::config_path() {
            if config_path.exists() {
                if let Ok(content) = std::fs::read_to_string(&config_path) {
                    if let Ok(config) = toml::from_str(&content) {
                        return config;
                    }
                }
            }
        }
        Self::default()
    }

    pub fn effective_data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join("slate")))
    }

    pub fn effective_debounce_ms(&self) -> u64 {
        self.autosave_debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)
    }

    pub fn effective_reminder_days(&self) -> u32 {
        self.backup_reminder_days.unwrap_or(DEFAULT_REMINDER_DAYS)
    }
}
