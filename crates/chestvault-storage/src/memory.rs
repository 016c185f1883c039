//! In-memory blob repository
//!
//! Used in place of the file repository by tests. Counts reads and writes and
//! can be told to fail writes, which is how storage-failure paths in the cache
//! are exercised.

use crate::traits::{BlobRepository, StorageError, StorageResult};
use chestvault_core::EntityKey;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct MemoryRepository {
    blobs: DashMap<EntityKey, Vec<u8>>,
    fail_writes: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with an IO error (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store raw bytes for a key, bypassing the codec
    pub fn insert_raw(&self, key: EntityKey, data: impl Into<Vec<u8>>) {
        self.blobs.insert(key, data.into());
    }

    /// Raw bytes stored for a key
    pub fn get_raw(&self, key: &EntityKey) -> Option<Vec<u8>> {
        self.blobs.get(key).map(|entry| entry.value().clone())
    }

    /// Number of `read_blob` calls so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of successful `write_blob` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl BlobRepository for MemoryRepository {
    fn read_blob(&self, key: &EntityKey) -> StorageResult<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.get_raw(key))
    }

    fn write_blob(&self, key: &EntityKey, data: &[u8]) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other(format!(
                "write rejected for {}",
                key
            ))));
        }

        self.blobs.insert(*key, data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete_blob(&self, key: &EntityKey) -> StorageResult<bool> {
        Ok(self.blobs.remove(key).is_some())
    }

    fn list_keys(&self) -> StorageResult<Vec<EntityKey>> {
        let mut keys: Vec<EntityKey> = self.blobs.iter().map(|entry| *entry.key()).collect();
        keys.sort();
        Ok(keys)
    }

    fn location(&self, key: &EntityKey) -> String {
        format!("memory://{}", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let repo = MemoryRepository::new();
        let key = EntityKey::new();

        repo.write_blob(&key, b"data").unwrap();

        assert_eq!(repo.read_blob(&key).unwrap(), Some(b"data".to_vec()));
        assert_eq!(repo.read_count(), 1);
        assert_eq!(repo.write_count(), 1);
    }

    #[test]
    fn test_fail_writes() {
        let repo = MemoryRepository::new();
        let key = EntityKey::new();

        repo.set_fail_writes(true);
        assert!(matches!(repo.write_blob(&key, b"x"), Err(StorageError::Io(_))));
        assert!(repo.get_raw(&key).is_none());
        assert_eq!(repo.write_count(), 0);

        repo.set_fail_writes(false);
        repo.write_blob(&key, b"x").unwrap();
        assert_eq!(repo.write_count(), 1);
    }

    #[test]
    fn test_delete() {
        let repo = MemoryRepository::new();
        let key = EntityKey::new();
        repo.insert_raw(key, "x");

        assert!(repo.delete_blob(&key).unwrap());
        assert!(!repo.delete_blob(&key).unwrap());
        assert!(repo.list_keys().unwrap().is_empty());
    }

    #[test]
    fn test_location() {
        let repo = MemoryRepository::new();
        let key: EntityKey = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        assert_eq!(
            repo.location(&key),
            "memory://550e8400-e29b-41d4-a716-446655440000"
        );
    }
}
