//! Application settings and configuration management

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// Jellyfin server URL
    pub server_url: String,
    /// API key sent with every request
    #[serde(default)]
    pub api_key: Option<String>,
    /// User ID for Jellyfin requests
    #[serde(default)]
    pub user_id: Option<String>,
    /// Name this client reports itself under
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default)]
    pub playback: PlaybackSettings,
}

/// Tunables for the playback session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Seconds between periodic progress reports.
    pub progress_report_interval_secs: u64,
    /// Position updates per second delivered to state subscribers.
    pub ui_updates_per_sec: u32,
    /// Position updates per second published for OS media controls.
    pub media_session_updates_per_sec: u32,
    /// Volume at session start, 0-100.
    pub initial_volume: u8,
    /// `previous` restarts the current track once this much has played.
    pub previous_restart_threshold_secs: u64,
    pub state_update_capacity: usize,
    pub command_buffer_size: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        PlaybackSettings {
            progress_report_interval_secs: 10,
            ui_updates_per_sec: 4,
            media_session_updates_per_sec: 1,
            initial_volume: 100,
            previous_restart_threshold_secs: 3,
            state_update_capacity: 64,
            command_buffer_size: 32,
        }
    }
}

fn default_device_name() -> String {
    "jelly-session".to_string()
}

/// Error types for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    IoError(io::Error),
    ParseError(String),
    ValidationError(String),
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "I/O error: {}", e),
            ConfigError::ParseError(s) => write!(f, "Parse error: {}", s),
            ConfigError::ValidationError(s) => write!(f, "Validation error: {}", s),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server_url: "http://localhost:8096".to_string(),
            api_key: None,
            user_id: None,
            device_name: default_device_name(),
            playback: PlaybackSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&self)?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("jelly-session").join("config.json")
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("Server URL cannot be empty".to_string()));
        }
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::ValidationError("API key must be provided".to_string()));
        }
        if self.user_id.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::ValidationError("User ID must be provided".to_string()));
        }
        self.playback.validate()
    }
}

impl PlaybackSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("progress_report_interval_secs", self.progress_report_interval_secs as usize),
            ("ui_updates_per_sec", self.ui_updates_per_sec as usize),
            ("media_session_updates_per_sec", self.media_session_updates_per_sec as usize),
            ("state_update_capacity", self.state_update_capacity),
            ("command_buffer_size", self.command_buffer_size),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ValidationError(format!("{} must be greater than zero", name)));
        }
        if self.initial_volume > 100 {
            return Err(ConfigError::ValidationError(format!(
                "initial_volume must be between 0 and 100, got {}",
                self.initial_volume
            )));
        }
        Ok(())
    }
}
