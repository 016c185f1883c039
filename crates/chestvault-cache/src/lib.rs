//! ChestVault Cache
//!
//! The in-memory side of ChestVault:
//! - `ChestCache`: keyed map of live records with exactly-once hydration
//! - `DirtyTracker`: keys with unsaved mutations
//! - `SlotContainer`: fixed-capacity slot view over one cached record
//! - `Flusher`: background task persisting dirty records on a fixed period
//! - `ChestService`: owns all of the above and exposes the host lifecycle hooks
//!
//! # Example
//! ```no_run
//! # use chestvault_cache::{ChestConfig, ChestService};
//! # use chestvault_core::{EntityKey, ItemStack};
//! # async fn example() -> chestvault_core::Result<()> {
//! let mut service = ChestService::new(ChestConfig::default())?;
//! service.start_flusher();
//!
//! let key = EntityKey::new();
//! service.on_entity_ready(&key);
//! let chest = service.open_container(&key);
//! chest.set(5, Some(ItemStack::new("stone", 10)))?;
//! service.on_entity_leave(&key);
//!
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod container;
pub mod dirty;
pub mod flusher;
pub mod service;

pub use cache::{CacheEntry, ChestCache, FlushStats, SaveStats};
pub use config::{ChestConfig, LoggingConfig};
pub use container::{ItemContainer, SlotContainer, DEFAULT_CAPACITY};
pub use dirty::DirtyTracker;
pub use flusher::Flusher;
pub use service::ChestService;
