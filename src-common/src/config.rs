//! Configuration management for scbridge.
//!
//! Handles loading and saving user configuration to platform-standard config directories:
//! - Linux: `~/.config/scbridge/config.json`
//! - macOS: `~/Library/Application Support/scbridge/config.json`
//! - Windows: `%APPDATA%\scbridge\config.json`

use crate::types::PickerConfiguration;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Event loop session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoopConfig {
    /// Switch a `prohibited` activation policy to `accessory` while the loop
    /// runs so picker UI can appear.
    #[serde(default = "default_promote_prohibited_policy")]
    pub promote_prohibited_policy: bool,
}

fn default_promote_prohibited_policy() -> bool {
    true
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            promote_prohibited_policy: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write a daily rolling log file to the platform log directory.
    #[serde(default)]
    pub file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: false,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Loop session settings group.
    #[serde(default, rename = "loop")]
    pub event_loop: LoopConfig,
    /// Default picker configuration, overridden per call.
    #[serde(default)]
    pub picker: PickerConfiguration,
    /// Logging settings group.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Get the path to the config file.
pub fn config_path() -> Result<PathBuf, String> {
    let proj_dirs =
        ProjectDirs::from("", "", "scbridge").ok_or("Could not determine config directory")?;

    Ok(proj_dirs.config_dir().join("config.json"))
}

/// Load configuration from an explicit path, falling back to defaults.
pub fn load_config_from(path: &Path) -> BridgeConfig {
    read_config_from(path).unwrap_or_else(|e| {
        warn!("{}. Using defaults.", e);
        BridgeConfig::default()
    })
}

/// Read configuration from disk, reporting an unreadable or invalid file
/// instead of falling back. A missing file yields the defaults.
///
/// For callers that must set up logging before they can report problems.
pub fn read_config() -> Result<BridgeConfig, String> {
    read_config_from(&config_path()?)
}

/// Read configuration from an explicit path. A missing file yields the defaults.
pub fn read_config_from(path: &Path) -> Result<BridgeConfig, String> {
    if !path.exists() {
        debug!("No config file at {:?}, using defaults", path);
        return Ok(BridgeConfig::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file {:?}: {}", path, e))?;
    let config = serde_json::from_str::<BridgeConfig>(&contents)
        .map_err(|e| format!("Failed to parse config file {:?}: {}", path, e))?;
    debug!("Loaded config from {:?}", path);
    Ok(config)
}

/// Save configuration to disk.
/// Creates the config directory if it doesn't exist.
pub fn save_config(config: &BridgeConfig) -> Result<PathBuf, String> {
    let path = config_path()?;
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save configuration to an explicit path.
pub fn save_config_to(config: &BridgeConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(path, json).map_err(|e| format!("Failed to write config file: {}", e))?;

    debug!("Saved config to {:?}", path);
    Ok(())
}
