//! Configuration management for tabgrid
//!
//! This module handles loading, parsing, and managing configuration from:
//! 1. Embedded default_config.toml (compile-time defaults)
//! 2. User config at ~/.config/tabgrid/config.toml (or platform-specific location)
//! 3. Project-local config at ./.tabgrid/config.toml

use crate::error::ConfigError;
use crate::insertion::InsertionPolicy;
use crate::partition::{PartitionPolicy, DEFAULT_INACTIVITY_DAYS};
use crate::recently_closed::{RecentlyClosedLimits, DEFAULT_CAPACITY, DEFAULT_MAX_AGE_HOURS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration embedded in binary
const DEFAULT_CONFIG: &str = include_str!("../../default_config.toml");

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabGridConfig {
    #[serde(default)]
    pub sections: SectionsConfig,
    #[serde(default)]
    pub insertion: InsertionConfig,
    #[serde(default)]
    pub recently_closed: RecentlyClosedConfig,
    #[serde(default)]
    pub privacy: PrivacyConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Section partitioning toggles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionsConfig {
    #[serde(default = "default_true")]
    pub grouping_enabled: bool,
    #[serde(default = "default_true")]
    pub inactive_tabs_enabled: bool,
    #[serde(default = "default_inactivity_threshold_days")]
    pub inactivity_threshold_days: i64,
}

impl Default for SectionsConfig {
    fn default() -> Self {
        Self {
            grouping_enabled: true,
            inactive_tabs_enabled: true,
            inactivity_threshold_days: default_inactivity_threshold_days(),
        }
    }
}

/// New tab placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertionConfig {
    #[serde(default = "default_true")]
    pub place_children_after_opener: bool,
}

impl Default for InsertionConfig {
    fn default() -> Self {
        Self {
            place_children_after_opener: true,
        }
    }
}

/// Undo-close buffer bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentlyClosedConfig {
    #[serde(default = "default_recently_closed_capacity")]
    pub capacity: usize,
    /// 0 disables the age bound
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: i64,
}

impl Default for RecentlyClosedConfig {
    fn default() -> Self {
        Self {
            capacity: default_recently_closed_capacity(),
            max_age_hours: default_max_age_hours(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Destroy private tabs when switching back to normal mode
    #[serde(default)]
    pub close_private_tabs_on_exit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub session_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty", "compact" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub timestamps: bool,
    #[serde(default = "default_false")]
    pub file_line: bool,
    #[serde(default = "default_false")]
    pub file_output: bool,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    /// Entries kept in the in-memory log buffer
    #[serde(default = "default_log_buffer_size")]
    pub buffer_size: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            timestamps: true,
            file_line: false,
            file_output: false,
            file_path: None,
            buffer_size: default_log_buffer_size(),
        }
    }
}

fn default_inactivity_threshold_days() -> i64 {
    DEFAULT_INACTIVITY_DAYS
}

fn default_recently_closed_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_max_age_hours() -> i64 {
    DEFAULT_MAX_AGE_HOURS
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_buffer_size() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

// ============================================================================
// Configuration loading
// ============================================================================

impl TabGridConfig {
    /// Load configuration with fallback chain:
    /// 1. Project-local .tabgrid/config.toml
    /// 2. User config ~/.config/tabgrid/config.toml
    /// 3. Embedded default_config.toml
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::embedded()?;

        let layers = [Self::user_config_path(), Self::project_config_path()];
        for path in layers.into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(layer) => {
                    config = layer;
                    tracing::info!("Loaded config from {:?}", path);
                }
                Err(e) => {
                    tracing::warn!("Failed to load config {:?}: {}", path, e);
                }
            }
        }

        Ok(config)
    }

    /// The compiled-in defaults
    pub fn embedded() -> Result<Self, ConfigError> {
        toml::from_str(DEFAULT_CONFIG)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse default config: {}", e)))
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Write configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let toml_string =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, toml_string).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Get the user config path (~/.config/tabgrid/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|config_dir| config_dir.join("tabgrid").join("config.toml"))
    }

    /// Get the project-local config path (./.tabgrid/config.toml)
    pub fn project_config_path() -> Option<PathBuf> {
        std::env::current_dir()
            .ok()
            .map(|cwd| cwd.join(".tabgrid").join("config.toml"))
    }

    /// Get the session file path (defaults to ~/.config/tabgrid/session.json)
    pub fn session_file_path(&self) -> PathBuf {
        self.persistence
            .session_file
            .clone()
            .or_else(|| {
                dirs::config_dir().map(|config_dir| config_dir.join("tabgrid").join("session.json"))
            })
            .unwrap_or_else(|| PathBuf::from("session.json"))
    }

    pub fn partition_policy(&self) -> PartitionPolicy {
        PartitionPolicy {
            grouping_enabled: self.sections.grouping_enabled,
            inactive_tabs_enabled: self.sections.inactive_tabs_enabled,
            inactivity_threshold: chrono::Duration::days(self.sections.inactivity_threshold_days.max(0)),
        }
    }

    pub fn insertion_policy(&self) -> InsertionPolicy {
        InsertionPolicy {
            place_children_after_opener: self.insertion.place_children_after_opener,
        }
    }

    pub fn recently_closed_limits(&self) -> RecentlyClosedLimits {
        RecentlyClosedLimits {
            capacity: self.recently_closed.capacity,
            max_age: (self.recently_closed.max_age_hours > 0)
                .then(|| chrono::Duration::hours(self.recently_closed.max_age_hours)),
        }
    }
}

impl Default for TabGridConfig {
    fn default() -> Self {
        Self::embedded().unwrap_or_else(|_| Self {
            sections: SectionsConfig::default(),
            insertion: InsertionConfig::default(),
            recently_closed: RecentlyClosedConfig::default(),
            privacy: PrivacyConfig::default(),
            persistence: PersistenceConfig::default(),
            logging: LoggingConfig::default(),
        })
    }
}
