//! Background flush task
//!
//! Runs [`ChestCache::flush_dirty`] on a fixed period. A change can therefore
//! stay unsaved for at most one period, or two if it raced a cycle's dirty-set
//! snapshot. Each cycle runs on a blocking thread; errors and panics inside a
//! cycle are logged and the schedule carries on.

use crate::cache::ChestCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

pub struct Flusher {
    period: Duration,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    /// Start flushing `cache` every `period`. The first cycle runs one period
    /// after start. Must be called from within a Tokio runtime.
    pub fn spawn(cache: Arc<ChestCache>, period: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {}
                }

                let cache = Arc::clone(&cache);
                match tokio::task::spawn_blocking(move || cache.flush_dirty()).await {
                    Ok(stats) => debug!(
                        flushed = stats.flushed,
                        failed = stats.failed,
                        skipped = stats.skipped,
                        "Flush cycle finished"
                    ),
                    Err(e) => error!("Flush cycle aborted: {}", e),
                }
            }

            debug!("Flusher stopped");
        });

        info!("Started flusher with a {:?} period", period);

        Self {
            period,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Flush period, which is also the maximum staleness of a saved change
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop scheduling cycles and wait for an in-flight cycle to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            error!("Flusher task ended abnormally: {}", e);
        }
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Flusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flusher")
            .field("period", &self.period)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chestvault_core::{EntityKey, ItemStack};
    use chestvault_storage::{MemoryRepository, RecordFormat, RecordStore};

    fn setup() -> (Arc<ChestCache>, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        let store = RecordStore::new(repo.clone(), RecordFormat::Json);
        (Arc::new(ChestCache::new(store)), repo)
    }

    #[tokio::test]
    async fn test_flusher_persists_dirty_records() {
        let (cache, repo) = setup();
        let key = EntityKey::new();
        cache
            .open_container(&key)
            .set(4, Some(ItemStack::new("stone", 10)))
            .unwrap();

        let flusher = Flusher::spawn(Arc::clone(&cache), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(200)).await;
        flusher.shutdown().await;

        assert!(repo.get_raw(&key).is_some());
        assert!(!cache.is_dirty(&key));
    }

    #[tokio::test]
    async fn test_flusher_survives_failing_writes() {
        let (cache, repo) = setup();
        let key = EntityKey::new();
        cache
            .open_container(&key)
            .set(0, Some(ItemStack::new("dirt", 1)))
            .unwrap();
        repo.set_fail_writes(true);

        let flusher = Flusher::spawn(Arc::clone(&cache), Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(flusher.is_running());
        assert!(repo.get_raw(&key).is_none());

        repo.set_fail_writes(false);
        tokio::time::sleep(Duration::from_millis(120)).await;
        flusher.shutdown().await;

        assert!(repo.get_raw(&key).is_some());
        assert!(!cache.is_dirty(&key));
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let (cache, repo) = setup();
        let flusher = Flusher::spawn(Arc::clone(&cache), Duration::from_millis(20));
        assert_eq!(flusher.period(), Duration::from_millis(20));
        flusher.shutdown().await;

        let key = EntityKey::new();
        cache.load(&key);
        cache.mark_dirty(&key);
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(repo.write_count(), 0);
        assert!(cache.is_dirty(&key));
    }
}
