//! Keyed cache of live records
//!
//! Once a key is loaded the cache is authoritative for it: the file is not
//! read again until the key is unloaded, so edits made to the file in the
//! meantime are never observed.

use crate::container::{DEFAULT_CAPACITY, SlotContainer};
use crate::dirty::DirtyTracker;
use chestvault_core::{EntityKey, Record};
use chestvault_storage::{RecordStore, StorageResult};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info};

/// Live record for one key, shared by the cache and every container built on
/// it. Cloning the entry clones the handle, not the record.
#[derive(Debug, Clone)]
pub struct CacheEntry(Arc<EntryState>);

#[derive(Debug)]
struct EntryState {
    record: RwLock<Record>,
    /// Held from snapshot to completed write, so saves of one key land in
    /// snapshot order
    save_lock: Mutex<()>,
}

impl CacheEntry {
    pub(crate) fn new(record: Record) -> Self {
        Self(Arc::new(EntryState {
            record: RwLock::new(record),
            save_lock: Mutex::new(()),
        }))
    }

    /// Shared access to the record
    pub fn read(&self) -> RwLockReadGuard<'_, Record> {
        self.0.record.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access to the record
    pub fn write(&self) -> RwLockWriteGuard<'_, Record> {
        self.0.record.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_saves(&self) -> MutexGuard<'_, ()> {
        self.0.save_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the record as it is right now
    pub fn snapshot(&self) -> Record {
        self.read().clone()
    }

    /// Whether both handles point at the same live record
    pub fn ptr_eq(&self, other: &CacheEntry) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Outcome of a save call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveStats {
    /// Records written
    pub saved: usize,
    /// Records whose write failed
    pub failed: usize,
}

/// Outcome of one flush cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Dirty keys written
    pub flushed: usize,
    /// Dirty keys whose write failed; they are marked dirty again
    pub failed: usize,
    /// Dirty keys that were no longer cached
    pub skipped: usize,
}

/// Concurrency-safe map from entity key to live record.
///
/// Storage failures never escape: reads degrade to empty records and failed
/// writes are logged and counted, leaving the in-memory record untouched.
pub struct ChestCache {
    store: RecordStore,
    entries: DashMap<EntityKey, CacheEntry>,
    dirty: DirtyTracker,
    capacity: u16,
}

impl ChestCache {
    /// Create a cache whose containers hold [`DEFAULT_CAPACITY`] slots
    pub fn new(store: RecordStore) -> Self {
        Self::with_capacity(store, DEFAULT_CAPACITY)
    }

    /// Create a cache whose containers hold `capacity` slots
    pub fn with_capacity(store: RecordStore, capacity: u16) -> Self {
        Self {
            store,
            entries: DashMap::new(),
            dirty: DirtyTracker::new(),
            capacity,
        }
    }

    /// Slot count of containers opened through this cache
    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Entry for `key`, hydrating it from storage on first use.
    ///
    /// Concurrent callers racing on an uncached key see exactly one storage
    /// read and all receive the same entry. The read happens while the map
    /// shard is locked, so other keys in that shard wait for it.
    pub fn load(&self, key: &EntityKey) -> CacheEntry {
        if let Some(entry) = self.get(key) {
            return entry;
        }

        self.entries
            .entry(*key)
            .or_insert_with(|| {
                debug!(key = %key, "Hydrating record");
                CacheEntry::new(self.store.read(key))
            })
            .value()
            .clone()
    }

    /// Cached entry for `key`. Never touches storage.
    pub fn get(&self, key: &EntityKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Persist one cached entry, or every cached entry when `key` is `None`.
    ///
    /// Uncached keys are ignored. A failed write is logged and does not stop
    /// the remaining entries from being saved.
    pub fn save(&self, key: Option<&EntityKey>) -> SaveStats {
        let Some(key) = key else {
            return self.save_every();
        };

        let mut stats = SaveStats::default();
        match self.try_save(key) {
            None => {}
            Some(Ok(())) => stats.saved += 1,
            Some(Err(_)) => stats.failed += 1,
        }
        stats
    }

    /// Persist every cached entry
    pub fn save_all(&self) -> SaveStats {
        self.save(None)
    }

    /// Save `key`, then drop it from the cache and the dirty set.
    ///
    /// The entry is dropped even if the save failed. Returns whether the key
    /// was cached.
    pub fn unload(&self, key: &EntityKey) -> bool {
        self.save(Some(key));
        let removed = self.entries.remove(key).is_some();
        self.dirty.clear(key);

        if removed {
            debug!(key = %key, "Unloaded record");
        }
        removed
    }

    /// Record that `key` has unsaved changes
    pub fn mark_dirty(&self, key: &EntityKey) {
        self.dirty.mark(*key);
    }

    pub fn is_dirty(&self, key: &EntityKey) -> bool {
        self.dirty.contains(key)
    }

    /// Number of keys currently marked dirty
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Persist the keys that are dirty right now.
    ///
    /// The dirty set is drained before any I/O starts. A key marked dirty
    /// while this runs may be left for the next cycle. Keys whose write fails
    /// are marked dirty again so the next cycle retries them.
    pub fn flush_dirty(&self) -> FlushStats {
        let mut stats = FlushStats::default();

        for key in self.dirty.drain_snapshot() {
            match self.try_save(&key) {
                None => stats.skipped += 1,
                Some(Ok(())) => stats.flushed += 1,
                Some(Err(_)) => {
                    self.dirty.mark(key);
                    stats.failed += 1;
                }
            }
        }

        if stats.flushed > 0 || stats.failed > 0 {
            info!(
                flushed = stats.flushed,
                failed = stats.failed,
                "Flushed dirty records"
            );
        }
        stats
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys currently cached, in ascending order
    pub fn keys(&self) -> Vec<EntityKey> {
        let mut keys: Vec<EntityKey> = self.entries.iter().map(|entry| *entry.key()).collect();
        keys.sort();
        keys
    }

    /// Build a fresh container over `key`'s record. Nothing is read until the
    /// container is first used.
    pub fn open_container(self: &Arc<Self>, key: &EntityKey) -> SlotContainer {
        SlotContainer::new(Arc::clone(self), *key)
    }

    fn save_every(&self) -> SaveStats {
        let mut stats = SaveStats::default();

        for key in self.keys() {
            match self.try_save(&key) {
                None => {}
                Some(Ok(())) => stats.saved += 1,
                Some(Err(_)) => stats.failed += 1,
            }
        }

        info!(saved = stats.saved, failed = stats.failed, "Saved all records");
        stats
    }

    /// Write the cached record for `key`; `None` if it is not cached.
    ///
    /// Saves of the same key are serialized. Mutations are not blocked while
    /// the write is in flight.
    fn try_save(&self, key: &EntityKey) -> Option<StorageResult<()>> {
        let entry = self.get(key)?;
        let _saving = entry.lock_saves();
        let record = entry.snapshot();

        let result = self.store.write(key, &record);
        if let Err(e) = &result {
            error!(
                key = %key,
                location = %self.store.location(key),
                "Failed to save record: {}",
                e
            );
        }
        Some(result)
    }
}

impl std::fmt::Debug for ChestCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChestCache")
            .field("store", &self.store)
            .field("cached", &self.entries.len())
            .field("dirty", &self.dirty.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chestvault_core::ItemStack;
    use chestvault_storage::{BlobRepository, MemoryRepository, RecordFormat};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Delays its first write so a second save can be started meanwhile
    #[derive(Default)]
    struct SlowFirstWrite {
        inner: MemoryRepository,
        write_started: AtomicBool,
    }

    impl BlobRepository for SlowFirstWrite {
        fn read_blob(&self, key: &EntityKey) -> StorageResult<Option<Vec<u8>>> {
            self.inner.read_blob(key)
        }

        fn write_blob(&self, key: &EntityKey, data: &[u8]) -> StorageResult<()> {
            if !self.write_started.swap(true, Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(300));
            }
            self.inner.write_blob(key, data)
        }

        fn delete_blob(&self, key: &EntityKey) -> StorageResult<bool> {
            self.inner.delete_blob(key)
        }

        fn list_keys(&self) -> StorageResult<Vec<EntityKey>> {
            self.inner.list_keys()
        }

        fn location(&self, key: &EntityKey) -> String {
            self.inner.location(key)
        }
    }

    fn memory_cache() -> (Arc<ChestCache>, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        let store = RecordStore::new(repo.clone(), RecordFormat::Json);
        (Arc::new(ChestCache::new(store)), repo)
    }

    fn put(entry: &CacheEntry, slot: i32, item: &str, quantity: i32) {
        entry
            .write()
            .put_slot(slot, Some(&ItemStack::new(item, quantity)));
    }

    #[test]
    fn test_get_before_load_is_absent() {
        let (cache, repo) = memory_cache();
        assert!(cache.get(&EntityKey::new()).is_none());
        assert_eq!(repo.read_count(), 0);
    }

    #[test]
    fn test_load_twice_returns_same_instance() {
        let (cache, repo) = memory_cache();
        let key = EntityKey::new();

        let first = cache.load(&key);
        let second = cache.load(&key);

        assert!(first.ptr_eq(&second));
        assert!(cache.get(&key).unwrap().ptr_eq(&first));
        assert_eq!(repo.read_count(), 1);
    }

    #[test]
    fn test_load_does_not_reread_storage() {
        let (cache, repo) = memory_cache();
        let key = EntityKey::new();
        cache.load(&key);

        // Edits behind the cache's back are not observed while cached
        repo.insert_raw(
            key,
            r#"{"items": [{"slot": 0, "itemId": "gold", "quantity": 1}]}"#,
        );

        assert!(cache.load(&key).read().is_empty());
    }

    #[test]
    fn test_concurrent_load_hydrates_once() {
        let (cache, repo) = memory_cache();
        let key = EntityKey::new();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.load(&key))
            })
            .collect();
        let entries: Vec<CacheEntry> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(repo.read_count(), 1);
        assert!(entries.iter().all(|e| e.ptr_eq(&entries[0])));
    }

    #[test]
    fn test_save_uncached_is_noop() {
        let (cache, repo) = memory_cache();
        let stats = cache.save(Some(&EntityKey::new()));
        assert_eq!(stats, SaveStats::default());
        assert_eq!(repo.write_count(), 0);
    }

    #[test]
    fn test_unload_then_load_rehydrates() {
        let (cache, repo) = memory_cache();
        let key = EntityKey::new();

        let entry = cache.load(&key);
        put(&entry, 2, "stone", 10);
        cache.mark_dirty(&key);

        assert!(cache.unload(&key));
        assert!(cache.get(&key).is_none());
        assert!(!cache.is_dirty(&key));
        assert_eq!(repo.write_count(), 1);

        let reloaded = cache.load(&key);
        assert!(!reloaded.ptr_eq(&entry));
        assert_eq!(
            reloaded.read().item_at(2).map(|i| i.to_stack()),
            Some(ItemStack::new("stone", 10))
        );
        assert_eq!(repo.read_count(), 2);
    }

    #[test]
    fn test_save_all_continues_past_failures() {
        let (cache, repo) = memory_cache();
        let a = EntityKey::new();
        let b = EntityKey::new();
        cache.load(&a);
        cache.load(&b);

        repo.set_fail_writes(true);
        let stats = cache.save_all();
        assert_eq!(stats, SaveStats { saved: 0, failed: 2 });

        repo.set_fail_writes(false);
        let stats = cache.save(None);
        assert_eq!(stats, SaveStats { saved: 2, failed: 0 });
    }

    #[test]
    fn test_failed_save_keeps_memory_and_dirty_state() {
        let (cache, repo) = memory_cache();
        let key = EntityKey::new();
        let entry = cache.load(&key);
        put(&entry, 0, "dirt", 4);
        cache.mark_dirty(&key);

        repo.set_fail_writes(true);
        let stats = cache.save(Some(&key));

        assert_eq!(stats.failed, 1);
        assert!(cache.is_dirty(&key));
        assert_eq!(entry.read().items.len(), 1);
        assert!(repo.get_raw(&key).is_none());
    }

    #[test]
    fn test_flush_dirty_saves_and_clears() {
        let (cache, repo) = memory_cache();
        let key = EntityKey::new();
        let clean = EntityKey::new();
        put(&cache.load(&key), 1, "stone", 3);
        cache.load(&clean);
        cache.mark_dirty(&key);

        let stats = cache.flush_dirty();

        assert_eq!(stats.flushed, 1);
        assert!(!cache.is_dirty(&key));
        assert!(repo.get_raw(&key).is_some());
        assert!(repo.get_raw(&clean).is_none());
    }

    #[test]
    fn test_flush_dirty_remarks_failed_keys() {
        let (cache, repo) = memory_cache();
        let key = EntityKey::new();
        cache.load(&key);
        cache.mark_dirty(&key);

        repo.set_fail_writes(true);
        let stats = cache.flush_dirty();
        assert_eq!(stats.failed, 1);
        assert!(cache.is_dirty(&key));

        repo.set_fail_writes(false);
        let stats = cache.flush_dirty();
        assert_eq!(stats.flushed, 1);
        assert!(!cache.is_dirty(&key));
    }

    #[test]
    fn test_unload_during_slow_flush_keeps_latest_record() {
        let repo = Arc::new(SlowFirstWrite::default());
        let store = RecordStore::new(repo.clone(), RecordFormat::Json);
        let cache = Arc::new(ChestCache::new(store));
        let key = EntityKey::new();

        let chest = cache.open_container(&key);
        chest.set(0, Some(ItemStack::new("stone", 10))).unwrap();

        let flushing = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.flush_dirty())
        };
        while !repo.write_started.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(5));
        }

        chest.set(0, Some(ItemStack::new("stone", 20))).unwrap();
        cache.unload(&key);
        assert_eq!(flushing.join().unwrap().flushed, 1);

        assert_eq!(
            cache.open_container(&key).get(0).unwrap(),
            Some(ItemStack::new("stone", 20))
        );
    }

    #[test]
    fn test_flush_dirty_skips_unloaded_keys() {
        let (cache, repo) = memory_cache();
        let key = EntityKey::new();
        cache.mark_dirty(&key);

        let stats = cache.flush_dirty();
        assert_eq!(stats.skipped, 1);
        assert_eq!(repo.write_count(), 0);
        assert_eq!(cache.dirty_len(), 0);
    }

    #[test]
    fn test_keys_and_len() {
        let (cache, _) = memory_cache();
        assert!(cache.is_empty());

        let a = EntityKey::new();
        let b = EntityKey::new();
        cache.load(&a);
        cache.load(&b);

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(cache.keys(), expected);
        assert_eq!(cache.len(), 2);
    }
}
