//! Memory tier in front of a durable tier.

use std::sync::{Mutex, PoisonError, RwLock};
use tracing::{debug, info};

use super::memory::MemoryStore;
use super::traits::{CacheStore, ManagedStore, StoreLifecycle};

/// Two-tier cache store.
///
/// Reads hit memory first and fall back to the durable tier, promoting
/// durable hits into memory. Writes go to both tiers. Normal traffic shares
/// a gate that `erase` takes exclusively, so a concurrent save lands either
/// entirely before or entirely after an erase.
///
/// A memory miss reads the durable tier and promotes the result while holding
/// the same write lock that `save` and `delete` take, so a promote can never
/// put back a value that a concurrent write has already replaced.
pub struct TieredStore {
  memory: MemoryStore,
  durable: Box<dyn ManagedStore>,
  gate: RwLock<()>,
  writes: Mutex<()>,
}

impl TieredStore {
  pub fn new(memory: MemoryStore, durable: impl ManagedStore + 'static) -> Self {
    Self {
      memory,
      durable: Box::new(durable),
      gate: RwLock::new(()),
      writes: Mutex::new(()),
    }
  }

  /// The memory tier, for inspection.
  pub fn memory(&self) -> &MemoryStore {
    &self.memory
  }
}

impl CacheStore for TieredStore {
  fn load(&self, key: &str) -> Option<Vec<u8>> {
    let _shared = self.gate.read().unwrap_or_else(PoisonError::into_inner);

    if let Some(bytes) = self.memory.load(key) {
      debug!(key, "memory hit");
      return Some(bytes);
    }

    let _writes = self.writes.lock().unwrap_or_else(PoisonError::into_inner);

    // A write may have landed while we waited for the lock
    if let Some(bytes) = self.memory.load(key) {
      debug!(key, "memory hit");
      return Some(bytes);
    }

    let bytes = self.durable.load(key)?;
    debug!(key, "durable hit");
    self.memory.save(key, Some(&bytes));
    Some(bytes)
  }

  fn save(&self, key: &str, value: Option<&[u8]>) {
    let _shared = self.gate.read().unwrap_or_else(PoisonError::into_inner);
    let _writes = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
    self.memory.save(key, value);
    self.durable.save(key, value);
  }

  fn delete(&self, key: &str) {
    let _shared = self.gate.read().unwrap_or_else(PoisonError::into_inner);
    let _writes = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
    self.memory.delete(key);
    self.durable.delete(key);
  }
}

impl StoreLifecycle for TieredStore {
  fn erase(&self) {
    let _exclusive = self.gate.write().unwrap_or_else(PoisonError::into_inner);
    self.memory.erase();
    self.durable.erase();
    info!("cache store erased");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use std::sync::{mpsc, Arc};
  use std::thread;
  use std::time::Duration;

  fn tiered(capacity: usize) -> TieredStore {
    TieredStore::new(
      MemoryStore::new(capacity),
      SqliteStorage::open_in_memory().unwrap(),
    )
  }

  /// Durable tier whose `load` reports that it has read, then stalls before
  /// returning, leaving a window for a concurrent write.
  struct StallingDurable {
    inner: SqliteStorage,
    loaded: Mutex<Option<mpsc::Sender<()>>>,
  }

  impl StallingDurable {
    fn new(inner: SqliteStorage) -> (Self, mpsc::Receiver<()>) {
      let (tx, rx) = mpsc::channel();
      let durable = Self {
        inner,
        loaded: Mutex::new(Some(tx)),
      };
      (durable, rx)
    }
  }

  impl CacheStore for StallingDurable {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
      let bytes = self.inner.load(key);
      if let Some(tx) = self.loaded.lock().unwrap().take() {
        tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(200));
      }
      bytes
    }

    fn save(&self, key: &str, value: Option<&[u8]>) {
      self.inner.save(key, value);
    }

    fn delete(&self, key: &str) {
      self.inner.delete(key);
    }
  }

  impl StoreLifecycle for StallingDurable {
    fn erase(&self) {
      self.inner.erase();
    }
  }

  /// A store whose durable tier holds `key = stale` and whose memory is empty.
  fn stalling(key: &str) -> (Arc<TieredStore>, mpsc::Receiver<()>) {
    let sqlite = SqliteStorage::open_in_memory().unwrap();
    sqlite.save(key, Some(b"stale"));
    let (durable, loaded) = StallingDurable::new(sqlite);
    (Arc::new(TieredStore::new(MemoryStore::new(4), durable)), loaded)
  }

  #[test]
  fn test_write_then_read() {
    let store = tiered(4);
    store.save("a", Some(b"1"));
    assert_eq!(store.load("a"), Some(b"1".to_vec()));
  }

  #[test]
  fn test_durable_hit_is_promoted() {
    let store = tiered(1);
    store.save("a", Some(b"1"));
    store.save("b", Some(b"2"));

    // "a" was evicted from memory but survives on the durable tier
    assert_eq!(store.memory().load("a"), None);
    assert_eq!(store.load("a"), Some(b"1".to_vec()));
    assert_eq!(store.memory().load("a"), Some(b"1".to_vec()));
  }

  #[test]
  fn test_delete_clears_both_tiers() {
    let store = tiered(4);
    store.save("a", Some(b"1"));
    store.delete("a");
    assert_eq!(store.memory().load("a"), None);
    assert_eq!(store.load("a"), None);
  }

  #[test]
  fn test_erase_clears_both_tiers() {
    let store = tiered(4);
    store.save("a", Some(b"1"));
    store.save("b", Some(b"2"));

    store.erase();

    assert!(store.memory().is_empty());
    assert_eq!(store.load("a"), None);
    assert_eq!(store.load("b"), None);
  }

  #[test]
  fn test_save_during_erase_is_all_or_nothing() {
    let store = Arc::new(tiered(64));

    let writer = {
      let store = Arc::clone(&store);
      thread::spawn(move || {
        for i in 0..50 {
          store.save(&format!("k{}", i), Some(b"v"));
        }
      })
    };

    store.erase();
    writer.join().unwrap();

    // Memory and durable tiers agree for every key
    for i in 0..50 {
      let key = format!("k{}", i);
      let in_memory = store.memory().load(&key).is_some();
      let anywhere = store.load(&key).is_some();
      assert_eq!(in_memory, anywhere);
    }
  }

  #[test]
  fn test_delete_during_promote_is_not_undone() {
    let (store, loaded) = stalling("k");

    let reader = {
      let store = Arc::clone(&store);
      thread::spawn(move || store.load("k"))
    };

    // The reader has the stale bytes in hand and is about to promote them
    loaded.recv().unwrap();
    store.delete("k");

    assert_eq!(reader.join().unwrap(), Some(b"stale".to_vec()));
    assert_eq!(store.memory().load("k"), None);
    assert_eq!(store.load("k"), None);
  }

  #[test]
  fn test_save_during_promote_wins() {
    let (store, loaded) = stalling("k");

    let reader = {
      let store = Arc::clone(&store);
      thread::spawn(move || store.load("k"))
    };

    loaded.recv().unwrap();
    store.save("k", Some(b"fresh"));

    assert_eq!(reader.join().unwrap(), Some(b"stale".to_vec()));
    assert_eq!(store.memory().load("k"), Some(b"fresh".to_vec()));
    assert_eq!(store.load("k"), Some(b"fresh".to_vec()));
  }
}
