//! Settings file loader and serialization.

use super::{validate_settings, Settings};
use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the global settings path: ~/.config/kmod-signer/settings.json
pub fn get_global_settings_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::ValidationFailed("Cannot determine home directory".to_string())
    })?;

    Ok(home.join(".config/kmod-signer/settings.json"))
}

/// Load settings from a JSON file.
pub fn load_settings_from_file(path: &Path) -> Result<Settings, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(format!(
                "Settings file not found at: {}",
                path.display()
            ))
        } else {
            ConfigError::IoError(e)
        }
    })?;

    let settings: Settings = serde_json::from_str(&content).map_err(ConfigError::InvalidJson)?;
    validate_settings(&settings)?;

    Ok(settings)
}

/// Save settings to a JSON file.
pub fn save_settings_to_file(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(ConfigError::IoError)?;
        }
    }

    let json_content = serde_json::to_string_pretty(settings).map_err(ConfigError::InvalidJson)?;
    fs::write(path, json_content).map_err(ConfigError::IoError)?;

    Ok(())
}

/// Resolve the settings for a run.
///
/// An explicitly requested file must exist. Without one, the global settings
/// file is used if present, otherwise defaults.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, ConfigError> {
    if let Some(path) = explicit {
        return load_settings_from_file(path);
    }

    let global = match get_global_settings_path() {
        Ok(path) => path,
        Err(_) => return Ok(Settings::default()),
    };
    if global.exists() {
        load_settings_from_file(&global)
    } else {
        Ok(Settings::default())
    }
}
