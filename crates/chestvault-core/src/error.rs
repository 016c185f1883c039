//! Error types for ChestVault Core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Slot index {index} out of range (capacity {capacity})")]
    IndexOutOfRange { index: i32, capacity: u16 },

    #[error("Invalid entity key: {0}")]
    InvalidKey(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
