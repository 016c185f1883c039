//! Storage trait definitions

use chestvault_core::EntityKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for chestvault_core::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => chestvault_core::Error::Io(e),
            other => chestvault_core::Error::Storage(other.to_string()),
        }
    }
}

/// Key → blob repository backing a record store.
///
/// Implementations only move bytes; encoding lives in [`crate::codec`].
/// No per-key locking is provided here: callers must not write the same key
/// from two threads at once.
pub trait BlobRepository: Send + Sync {
    /// Read the blob stored for a key, `None` when nothing was ever written
    fn read_blob(&self, key: &EntityKey) -> StorageResult<Option<Vec<u8>>>;

    /// Replace the blob stored for a key
    fn write_blob(&self, key: &EntityKey, data: &[u8]) -> StorageResult<()>;

    /// Remove the blob for a key. Returns `false` if there was none.
    fn delete_blob(&self, key: &EntityKey) -> StorageResult<bool>;

    /// Every key that currently has a blob, in ascending order
    fn list_keys(&self) -> StorageResult<Vec<EntityKey>>;

    /// Human-readable location of a key's blob, for log lines
    fn location(&self, key: &EntityKey) -> String;
}
