//! Service configuration
//!
//! Loaded from a YAML or TOML file (by extension), then overridden by
//! `CHESTVAULT_*` environment variables.

use crate::container::DEFAULT_CAPACITY;
use chestvault_core::{Error, Result};
use chestvault_storage::RecordFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChestConfig {
    /// Directory holding one record file per entity
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Record file extension, which also selects the format
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Slots per container
    #[serde(default = "default_capacity")]
    pub capacity: u16,

    /// Seconds between flush cycles
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Write through a temp file and rename instead of rewriting in place
    #[serde(default)]
    pub atomic_writes: bool,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ChestConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            extension: default_extension(),
            capacity: default_capacity(),
            flush_interval_secs: default_flush_interval_secs(),
            atomic_writes: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ChestConfig {
    /// Read a config file. `.toml` files are parsed as TOML, anything else as
    /// YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("Invalid TOML in {:?}: {}", path, e)))?
        } else {
            serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("Invalid YAML in {:?}: {}", path, e)))?
        };

        Ok(config)
    }

    /// Serialize in the format matching `path`'s extension and write it
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let contents = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::to_string_pretty(self)
                .map_err(|e| Error::Config(format!("TOML serialization error: {}", e)))?
        } else {
            serde_yaml::to_string(self)
                .map_err(|e| Error::Config(format!("YAML serialization error: {}", e)))?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Merge environment variables into config (env vars take precedence).
    /// Unparseable values are ignored.
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("CHESTVAULT_ROOT_DIR") {
            self.root_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("CHESTVAULT_EXTENSION") {
            self.extension = val;
        }

        if let Ok(val) = std::env::var("CHESTVAULT_CAPACITY")
            && let Ok(capacity) = val.parse::<u16>()
        {
            self.capacity = capacity;
        }

        if let Ok(val) = std::env::var("CHESTVAULT_FLUSH_INTERVAL_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            self.flush_interval_secs = secs;
        }

        if let Ok(val) = std::env::var("CHESTVAULT_ATOMIC_WRITES")
            && let Ok(enabled) = val.parse::<bool>()
        {
            self.atomic_writes = enabled;
        }

        if let Ok(val) = std::env::var("CHESTVAULT_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::Config("capacity must be at least 1".to_string()));
        }

        if self.flush_interval_secs == 0 {
            return Err(Error::Config(
                "flush_interval_secs must be at least 1".to_string(),
            ));
        }

        if self.record_format().is_none() {
            return Err(Error::Config(format!(
                "extension '{}' is not one of json, yaml, yml, toml",
                self.extension
            )));
        }

        Ok(())
    }

    /// Flush period, which is also the maximum staleness of a saved change
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Record format selected by the extension
    pub fn record_format(&self) -> Option<RecordFormat> {
        RecordFormat::from_extension(&self.extension)
    }

    /// Root directory with a leading `~` expanded to the home directory
    pub fn resolved_root_dir(&self) -> Result<PathBuf> {
        match self.root_dir.strip_prefix("~") {
            Ok(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .ok_or_else(|| Error::Config("Could not determine home directory".to_string())),
            Err(_) => Ok(self.root_dir.clone()),
        }
    }
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("./chests")
}

fn default_extension() -> String {
    "json".to_string()
}

fn default_capacity() -> u16 {
    DEFAULT_CAPACITY
}

fn default_flush_interval_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}
