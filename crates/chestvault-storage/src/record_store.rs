//! Record store: codec plus blob repository

use crate::codec::RecordFormat;
use crate::file_repository::FileRepository;
use crate::traits::{BlobRepository, StorageError, StorageResult};
use chestvault_core::{EntityKey, Record};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Translates entity keys to persisted records and back.
///
/// Reads never fail: anything that cannot be read or parsed is logged and
/// treated as "no saved data". Writes report their error to the caller.
/// There is no locking here; the cache owns each record and serializes access
/// per key.
#[derive(Clone)]
pub struct RecordStore {
    repository: Arc<dyn BlobRepository>,
    format: RecordFormat,
}

impl RecordStore {
    pub fn new(repository: Arc<dyn BlobRepository>, format: RecordFormat) -> Self {
        Self { repository, format }
    }

    /// File-backed store at `<root>/<key>.<extension>`
    pub fn files(
        root: impl Into<PathBuf>,
        extension: &str,
        atomic_writes: bool,
    ) -> StorageResult<Self> {
        let format = RecordFormat::from_extension(extension).ok_or_else(|| {
            StorageError::InvalidData(format!("Unsupported record extension '{}'", extension))
        })?;
        let repository = FileRepository::new(root, extension).with_atomic_writes(atomic_writes);
        Ok(Self::new(Arc::new(repository), format))
    }

    pub fn format(&self) -> RecordFormat {
        self.format
    }

    /// Persisted record for `key`, or a fresh empty one.
    pub fn read(&self, key: &EntityKey) -> Record {
        match self.try_read(key) {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(key = %key, "No saved record, starting empty");
                Record::new(*key)
            }
            Err(e) => {
                warn!(
                    key = %key,
                    location = %self.repository.location(key),
                    "Failed to read record, using empty record: {}",
                    e
                );
                Record::new(*key)
            }
        }
    }

    /// Like [`read`](Self::read) but surfaces missing data and failures.
    ///
    /// A decoded record is always re-keyed to `key`, whatever the file says.
    pub fn try_read(&self, key: &EntityKey) -> StorageResult<Option<Record>> {
        let Some(data) = self.repository.read_blob(key)? else {
            return Ok(None);
        };

        let mut record = self.format.decode(&data)?;
        if record.key != *key {
            debug!(key = %key, stored = %record.key, "Re-keying decoded record");
            record.key = *key;
        }
        Ok(Some(record))
    }

    /// Encode and write `record` as the blob for `key`
    pub fn write(&self, key: &EntityKey, record: &Record) -> StorageResult<()> {
        if record.key != *key {
            return Err(StorageError::InvalidData(format!(
                "Record for {} cannot be written under key {}",
                record.key, key
            )));
        }

        let data = self.format.encode(record)?;
        self.repository.write_blob(key, &data)?;
        debug!(key = %key, items = record.items.len(), "Wrote record");
        Ok(())
    }

    /// Remove `key`'s persisted record. Returns `false` if none existed.
    pub fn delete(&self, key: &EntityKey) -> StorageResult<bool> {
        let removed = self.repository.delete_blob(key)?;
        if removed {
            debug!(key = %key, "Deleted record");
        }
        Ok(removed)
    }

    /// Keys that have a persisted record
    pub fn list_keys(&self) -> StorageResult<Vec<EntityKey>> {
        self.repository.list_keys()
    }

    /// Where a key's record lives, for log lines and diagnostics
    pub fn location(&self, key: &EntityKey) -> String {
        self.repository.location(key)
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}
