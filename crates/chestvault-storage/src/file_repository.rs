//! One-file-per-key blob repository

use crate::atomic_writer::AtomicWriter;
use crate::traits::{BlobRepository, StorageResult};
use chestvault_core::EntityKey;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores each key's blob at `<root>/<key>.<extension>`.
///
/// Plain writes truncate and rewrite the file in place, so a crash mid-write
/// can leave a truncated file behind. With atomic writes enabled the blob is
/// written to a sibling temp file and renamed over the target instead.
#[derive(Debug, Clone)]
pub struct FileRepository {
    root: PathBuf,
    extension: String,
    atomic_writes: bool,
}

impl FileRepository {
    /// Create a repository rooted at `root`. The directory is created lazily
    /// on first write.
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            root: root.into(),
            extension: extension.trim_start_matches('.').to_string(),
            atomic_writes: false,
        }
    }

    /// Route writes through a temp file and rename
    pub fn with_atomic_writes(mut self, atomic_writes: bool) -> Self {
        self.atomic_writes = atomic_writes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Path of the file holding a key's blob
    pub fn path_for(&self, key: &EntityKey) -> PathBuf {
        self.root.join(format!("{}.{}", key, self.extension))
    }
}

impl BlobRepository for FileRepository {
    fn read_blob(&self, key: &EntityKey) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_blob(&self, key: &EntityKey, data: &[u8]) -> StorageResult<()> {
        let path = self.path_for(key);

        if self.atomic_writes {
            return AtomicWriter::write_file(&path, data);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        Ok(())
    }

    fn delete_blob(&self, key: &EntityKey) -> StorageResult<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list_keys(&self) -> StorageResult<Vec<EntityKey>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match stem.parse::<EntityKey>() {
                Ok(key) => keys.push(key),
                Err(_) => debug!("Skipping non-record file {:?}", path),
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn location(&self, key: &EntityKey) -> String {
        self.path_for(key).display().to_string()
    }
}
