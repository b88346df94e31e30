use std::path::{Path, PathBuf};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Application settings, persisted to `<config dir>/termmd/settings.json`.
///
/// `#[serde(default)]` on the struct fills fields missing from an older
/// settings file with their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Settings {
    /// Command that starts the assistant CLI in the terminal pane.
    pub claude_command: String,
    /// Save the buffer before a selection is sent to the assistant.
    pub auto_save_before_send: bool,
    /// Shell spawned by the terminal pane.
    pub shell_path: String,
    /// Interval between disk checks of the open file.
    pub poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            claude_command: String::from("claude"),
            auto_save_before_send: true,
            shell_path: String::from("/bin/zsh"),
            poll_interval_ms: 500,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Whether `shell_path` names an executable regular file.
    pub fn shell_path_is_executable(&self) -> bool {
        let Ok(metadata) = std::fs::metadata(&self.shell_path) else {
            return false;
        };
        if !metadata.is_file() {
            return false;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode() & 0o111 != 0
        }
        #[cfg(not(unix))]
        {
            true
        }
    }
}

/// Default location of the settings file.
pub fn settings_path() -> Result<PathBuf, SettingsError> {
    dirs::config_dir()
        .map(|dir| dir.join("termmd").join("settings.json"))
        .ok_or(SettingsError::NoConfigDir)
}

/// Load settings from `path`. A missing file yields the defaults; a file
/// that fails to parse is logged and also yields the defaults.
pub fn load_from(path: &Path) -> Settings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Invalid settings at {}: {}", path.display(), e);
                Settings::default()
            }
        },
        Err(_) => Settings::default(),
    }
}

pub fn save_to(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load from the default location.
pub fn load() -> Settings {
    match settings_path() {
        Ok(path) => load_from(&path),
        Err(e) => {
            log::warn!("{}, using default settings", e);
            Settings::default()
        }
    }
}

pub fn save(settings: &Settings) -> Result<(), SettingsError> {
    save_to(&settings_path()?, settings)
}

/// JSON Schema describing [`Settings`].
pub fn settings_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(Settings);
    serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
}
