//! Application settings and configuration management

use crate::catalog::SoundCategory;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Playback policy for one alert category.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CategoryPolicy {
    /// Asset name (file stem) or file name to play for this category
    pub file_name: String,
    /// Bounded-loop duration in seconds; `0` plays the sound once
    #[serde(default)]
    pub duration_secs: f64,
    /// When false the sound loops until cancelled
    #[serde(default = "default_auto_stop")]
    pub auto_stop: bool,
}

fn default_auto_stop() -> bool {
    true
}

/// Application settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    /// Directory scanned for alert sound files
    #[serde(default = "default_sound_directory")]
    pub sound_directory: PathBuf,
    /// Maximum number of pending alerts before the oldest are evicted
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Preferred output device name; `None` uses the platform default
    #[serde(default)]
    pub output_device: Option<String>,
    #[serde(default = "default_intrusion_policy")]
    pub intrusion: CategoryPolicy,
    #[serde(default = "default_fault_policy")]
    pub fault: CategoryPolicy,
    #[serde(default = "default_action_policy")]
    pub action: CategoryPolicy,
}

fn default_sound_directory() -> PathBuf {
    PathBuf::from("sounds")
}

fn default_queue_capacity() -> usize {
    3
}

fn default_intrusion_policy() -> CategoryPolicy {
    CategoryPolicy {
        file_name: "intrusion".to_string(),
        duration_secs: 10.0,
        auto_stop: true,
    }
}

fn default_fault_policy() -> CategoryPolicy {
    CategoryPolicy {
        file_name: "fault".to_string(),
        duration_secs: 5.0,
        auto_stop: true,
    }
}

fn default_action_policy() -> CategoryPolicy {
    CategoryPolicy {
        file_name: "action".to_string(),
        duration_secs: 0.0,
        auto_stop: true,
    }
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

impl Error for ConfigError {}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            sound_directory: default_sound_directory(),
            queue_capacity: default_queue_capacity(),
            output_device: None,
            intrusion: default_intrusion_policy(),
            fault: default_fault_policy(),
            action: default_action_policy(),
        }
    }
}

impl Settings {
    /// Load settings from a file, falling back to defaults when it does not exist
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

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("r-alertsound").join("config.json")
    }

    /// Policy for `category`; `None` has no configured sound.
    pub fn policy(&self, category: SoundCategory) -> Option<&CategoryPolicy> {
        match category {
            SoundCategory::Intrusion => Some(&self.intrusion),
            SoundCategory::Fault => Some(&self.fault),
            SoundCategory::Action => Some(&self.action),
            SoundCategory::None => None,
        }
    }

    /// Configured file name per category, in the shape the asset provider expects
    pub fn category_files(&self) -> Vec<(SoundCategory, String)> {
        vec![
            (SoundCategory::Intrusion, self.intrusion.file_name.clone()),
            (SoundCategory::Fault, self.fault.file_name.clone()),
            (SoundCategory::Action, self.action.file_name.clone()),
        ]
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity < 1 {
            return Err(ConfigError::ValidationError("Queue capacity must be at least 1".to_string()));
        }

        if self.sound_directory.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError("Sound directory cannot be empty".to_string()));
        }

        for (label, policy) in [("intrusion", &self.intrusion), ("fault", &self.fault), ("action", &self.action)] {
            if policy.file_name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{} sound file name cannot be empty", label)));
            }
            if !policy.duration_secs.is_finite() || policy.duration_secs < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} duration must be a non-negative number of seconds",
                    label
                )));
            }
        }

        Ok(())
    }
}
