//! Runtime settings
//!
//! An explicit value populated once at process start and threaded through
//! step configuration and task contexts. A snapshot travels with every
//! serialized context so an out-of-process run sees the same settings.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`STEPFLOW_LOG_LEVEL`, `STEPFLOW_TEMP_DIR`)
//! 2. Settings file (YAML)
//! 3. Defaults

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::{Result, StepflowError};

/// Environment variable holding a full `EnvFilter` directive for the process logger
pub const LOG_FILTER_ENV: &str = "STEPFLOW_LOG";

const LOG_LEVEL_ENV: &str = "STEPFLOW_LOG_LEVEL";
const TEMP_DIR_ENV: &str = "STEPFLOW_TEMP_DIR";

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Level of the process logger and of per-task log files
    pub log_level: String,

    /// Create a log file per task (modules may still opt out)
    pub create_log_files: bool,

    /// Scratch directory handed to modules
    pub temp_dir: PathBuf,

    /// Free-form settings, uninterpreted by the engine
    pub extra: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            create_log_files: true,
            temp_dir: std::env::temp_dir(),
            extra: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Parse settings from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.log_filter()?;
        Ok(settings)
    }

    /// Load settings from a YAML file
    ///
    /// Returns default settings if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Merge with environment variables
    ///
    /// Environment variables take precedence over file values.
    pub fn with_env(mut self) -> Self {
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            if !level.is_empty() {
                self.log_level = level;
            }
        }
        if let Ok(dir) = std::env::var(TEMP_DIR_ENV) {
            if !dir.is_empty() {
                self.temp_dir = PathBuf::from(dir);
            }
        }
        self
    }

    /// Get a free-form setting
    pub fn get(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    /// Set a free-form setting
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extra.insert(key.into(), value.into());
    }

    /// Configured log level as a tracing filter
    pub fn log_filter(&self) -> Result<LevelFilter> {
        parse_level(&self.log_level)
    }

    /// Install the process-wide logger
    ///
    /// Uses `STEPFLOW_LOG` when set, the configured level otherwise.
    /// Installing twice is a no-op.
    pub fn init_tracing(&self) -> Result<()> {
        let level = self.log_filter()?;
        let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
            .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

        // Fails only when a global subscriber already exists
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
        Ok(())
    }
}

/// Parse a log level name (case-insensitive)
pub fn parse_level(level: &str) -> Result<LevelFilter> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" | "all" | "finest" => Ok(LevelFilter::TRACE),
        "debug" | "fine" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" | "severe" => Ok(LevelFilter::ERROR),
        "off" => Ok(LevelFilter::OFF),
        _ => Err(StepflowError::InvalidLogLevel {
            level: level.to_string(),
        }),
    }
}
