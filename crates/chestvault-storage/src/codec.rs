//! Record encoding
//!
//! Records are stored as pretty-printed structured text so they stay readable
//! and diffable by hand. The format is chosen from the file extension.

use crate::traits::{StorageError, StorageResult};
use chestvault_core::Record;

/// Record file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
    /// JSON format
    #[default]
    Json,
    /// YAML format
    Yaml,
    /// TOML format
    Toml,
}

impl RecordFormat {
    /// Format for a file extension, `None` if the extension is not supported
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    /// Encode a record as pretty-printed text
    pub fn encode(&self, record: &Record) -> StorageResult<Vec<u8>> {
        let text = match self {
            Self::Json => serde_json::to_string_pretty(record)
                .map_err(|e| StorageError::Serialization(format!("JSON serialize error: {}", e)))?,
            Self::Yaml => serde_yaml::to_string(record)
                .map_err(|e| StorageError::Serialization(format!("YAML serialize error: {}", e)))?,
            Self::Toml => toml::to_string_pretty(record)
                .map_err(|e| StorageError::Serialization(format!("TOML serialize error: {}", e)))?,
        };
        Ok(text.into_bytes())
    }

    /// Decode a record. Missing fields fall back to their defaults.
    pub fn decode(&self, data: &[u8]) -> StorageResult<Record> {
        let text = std::str::from_utf8(data)
            .map_err(|e| StorageError::Deserialization(format!("Record is not UTF-8: {}", e)))?;

        match self {
            Self::Json => serde_json::from_str(text)
                .map_err(|e| StorageError::Deserialization(format!("JSON parse error: {}", e))),
            Self::Yaml => serde_yaml::from_str(text)
                .map_err(|e| StorageError::Deserialization(format!("YAML parse error: {}", e))),
            Self::Toml => toml::from_str(text)
                .map_err(|e| StorageError::Deserialization(format!("TOML parse error: {}", e))),
        }
    }
}
