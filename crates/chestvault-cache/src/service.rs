//! Host-facing entry point
//!
//! `ChestService` owns the cache and the flusher and maps the host's entity
//! lifecycle onto them: an entity becoming ready hydrates its record, an
//! entity leaving saves and evicts it, and shutdown stops the flusher and
//! saves whatever is still cached.

use crate::cache::{CacheEntry, ChestCache, FlushStats, SaveStats};
use crate::config::ChestConfig;
use crate::container::SlotContainer;
use crate::flusher::Flusher;
use chestvault_core::{EntityKey, Result};
use chestvault_storage::RecordStore;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct ChestService {
    config: ChestConfig,
    cache: Arc<ChestCache>,
    flusher: Option<Flusher>,
}

impl ChestService {
    /// Build a file-backed service from `config`
    pub fn new(config: ChestConfig) -> Result<Self> {
        config.validate()?;

        let root = config.resolved_root_dir()?;
        let store = RecordStore::files(&root, &config.extension, config.atomic_writes)?;
        info!(
            root = %root.display(),
            extension = %config.extension,
            capacity = config.capacity,
            "Chest storage ready"
        );

        Self::with_store(store, config)
    }

    /// Build a service over an existing store. The config's storage fields
    /// are ignored.
    pub fn with_store(store: RecordStore, config: ChestConfig) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(ChestCache::with_capacity(store, config.capacity));
        Ok(Self {
            config,
            cache,
            flusher: None,
        })
    }

    /// Start the periodic flusher. Does nothing if it is already running.
    /// Must be called from within a Tokio runtime.
    pub fn start_flusher(&mut self) {
        if self.flusher.is_some() {
            return;
        }
        self.flusher = Some(Flusher::spawn(
            Arc::clone(&self.cache),
            self.config.flush_interval(),
        ));
    }

    pub fn is_flushing(&self) -> bool {
        self.flusher.as_ref().is_some_and(Flusher::is_running)
    }

    pub fn cache(&self) -> &Arc<ChestCache> {
        &self.cache
    }

    pub fn config(&self) -> &ChestConfig {
        &self.config
    }

    /// The entity behind `key` became active
    pub fn on_entity_ready(&self, key: &EntityKey) -> CacheEntry {
        debug!(key = %key, "Entity ready");
        self.cache.load(key)
    }

    /// The entity behind `key` went away. Its record is saved and evicted.
    pub fn on_entity_leave(&self, key: &EntityKey) {
        debug!(key = %key, "Entity leaving");
        self.cache.unload(key);
    }

    /// Fresh container over `key`'s cached record
    pub fn open_container(&self, key: &EntityKey) -> SlotContainer {
        self.cache.open_container(key)
    }

    /// Run one flush cycle on the calling thread
    pub fn flush_now(&self) -> FlushStats {
        self.cache.flush_dirty()
    }

    /// Stop the flusher, then save every cached record
    pub async fn shutdown(mut self) -> SaveStats {
        if let Some(flusher) = self.flusher.take() {
            flusher.shutdown().await;
        }

        let cache = Arc::clone(&self.cache);
        match tokio::task::spawn_blocking(move || cache.save_all()).await {
            Ok(stats) => {
                info!(
                    saved = stats.saved,
                    failed = stats.failed,
                    "Chest service stopped"
                );
                stats
            }
            Err(e) => {
                error!("Final save aborted: {}", e);
                SaveStats::default()
            }
        }
    }
}

impl std::fmt::Debug for ChestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChestService")
            .field("config", &self.config)
            .field("cached", &self.cache.len())
            .field("flusher", &self.flusher)
            .finish()
    }
}
