//! ChestVault Storage
//!
//! This crate turns entity keys into persisted records and back:
//! - Blob repositories (one file per key, or in-memory for tests)
//! - Record codec (JSON, YAML or TOML, pretty-printed)
//! - Optional atomic temp-file-then-rename writes
//! - `RecordStore`, the read-or-default / write facade used by the cache

pub mod atomic_writer;
pub mod codec;
pub mod file_repository;
pub mod memory;
pub mod record_store;
pub mod traits;

pub use codec::RecordFormat;
pub use file_repository::FileRepository;
pub use memory::MemoryRepository;
pub use record_store::RecordStore;
pub use traits::{BlobRepository, StorageError, StorageResult};
