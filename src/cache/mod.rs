//! Byte-level cache stores.
//!
//! This module provides the storage half of the cache-through client:
//! - A `CacheStore` contract (`load` / `save` / `delete`) keyed by canonical resource keys
//! - A bounded LRU memory tier
//! - Durable tiers backed by plain files or SQLite
//! - A tiered composition with a lock-guarded `erase`

mod files;
mod memory;
mod noop;
mod storage;
mod tiered;
mod traits;

pub use files::{DiskInit, FileStore};
pub use memory::{MemoryStore, DEFAULT_MEMORY_CAPACITY};
pub use noop::NoopStore;
pub use storage::SqliteStorage;
pub use tiered::TieredStore;
pub use traits::{CacheStore, ManagedStore, StoreLifecycle};

use color_eyre::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::{CacheBackend, Config};

/// Build the store described by `config`.
pub fn open_store(config: &Config) -> Result<Arc<dyn ManagedStore>> {
  if !config.cache.enabled {
    info!("caching disabled");
    return Ok(Arc::new(NoopStore));
  }

  let directory = config.cache_directory()?;
  let memory = MemoryStore::new(config.cache.memory_capacity);

  let store = match config.cache.backend {
    CacheBackend::Files => TieredStore::new(memory, FileStore::open(directory.join("entries"))),
    CacheBackend::Sqlite => {
      TieredStore::new(memory, SqliteStorage::open(&directory.join("cache.db"))?)
    }
  };

  info!(directory = %directory.display(), backend = ?config.cache.backend, "cache store opened");
  Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config(yaml: &str) -> Config {
    Config::parse(yaml).unwrap()
  }

  #[test]
  fn test_disabled_cache_never_hits() {
    let store = open_store(&config(
      "api:\n  authority: api.example.com\ncache:\n  enabled: false\n",
    ))
    .unwrap();

    store.save("k", Some(b"v"));
    assert_eq!(store.load("k"), None);
  }

  #[test]
  fn test_sqlite_backend_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
      "api:\n  authority: api.example.com\ncache:\n  backend: sqlite\n  directory: {}\n",
      dir.path().display()
    );
    let store = open_store(&config(&yaml)).unwrap();

    store.save("k", Some(b"v"));
    assert_eq!(store.load("k"), Some(b"v".to_vec()));
    assert!(dir.path().join("cache.db").exists());

    store.erase();
    assert_eq!(store.load("k"), None);
  }

  #[test]
  fn test_files_backend_erase() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
      "api:\n  authority: api.example.com\ncache:\n  directory: {}\n",
      dir.path().display()
    );
    let store = open_store(&config(&yaml)).unwrap();

    store.save("k", Some(b"v"));
    assert!(dir.path().join("entries").is_dir());

    store.erase();
    assert_eq!(store.load("k"), None);
    assert!(!dir.path().join("entries").exists());
  }
}
