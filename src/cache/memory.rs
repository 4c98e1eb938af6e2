//! Bounded in-memory tier with least-recently-used eviction.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::traits::{CacheStore, StoreLifecycle};

/// Default number of entries kept in memory.
pub const DEFAULT_MEMORY_CAPACITY: usize = 256;

/// In-memory LRU tier.
///
/// A hit promotes the entry to most-recently-used; inserting beyond capacity
/// evicts the least-recently-used entry first.
pub struct MemoryStore {
  entries: Mutex<LruCache<String, Vec<u8>>>,
}

impl MemoryStore {
  /// Create a memory tier holding at most `capacity` entries (minimum 1).
  pub fn new(capacity: usize) -> Self {
    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    Self {
      entries: Mutex::new(LruCache::new(capacity)),
    }
  }

  /// Number of entries currently held.
  pub fn len(&self) -> usize {
    self.entries().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries().is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.entries().cap().get()
  }

  fn entries(&self) -> MutexGuard<'_, LruCache<String, Vec<u8>>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new(DEFAULT_MEMORY_CAPACITY)
  }
}

impl CacheStore for MemoryStore {
  fn load(&self, key: &str) -> Option<Vec<u8>> {
    self.entries().get(key).cloned()
  }

  fn save(&self, key: &str, value: Option<&[u8]>) {
    let mut entries = self.entries();
    match value {
      Some(bytes) => {
        if let Some((evicted, _)) = entries.push(key.to_string(), bytes.to_vec()) {
          if evicted != key {
            debug!(key = %evicted, "evicted from memory tier");
          }
        }
      }
      None => {
        entries.pop(key);
      }
    }
  }

  fn delete(&self, key: &str) {
    self.entries().pop(key);
  }
}

impl StoreLifecycle for MemoryStore {
  fn erase(&self) {
    self.entries().clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_save_then_load() {
    let store = MemoryStore::new(4);
    store.save("a", Some(b"one"));
    assert_eq!(store.load("a"), Some(b"one".to_vec()));

    store.save("a", Some(b"two"));
    assert_eq!(store.load("a"), Some(b"two".to_vec()));
    assert_eq!(store.len(), 1);
  }

  #[test]
  fn test_evicts_least_recently_used() {
    let store = MemoryStore::new(2);
    store.save("a", Some(b"1"));
    store.save("b", Some(b"2"));

    // Touch "a" so "b" becomes the eviction candidate
    assert!(store.load("a").is_some());

    store.save("c", Some(b"3"));
    assert_eq!(store.load("b"), None);
    assert_eq!(store.load("a"), Some(b"1".to_vec()));
    assert_eq!(store.load("c"), Some(b"3".to_vec()));
  }

  #[test]
  fn test_save_none_removes() {
    let store = MemoryStore::new(2);
    store.save("a", Some(b"1"));
    store.save("a", None);
    assert_eq!(store.load("a"), None);
    assert!(store.is_empty());
  }

  #[test]
  fn test_erase_evicts_everything() {
    let store = MemoryStore::new(8);
    for key in ["a", "b", "c"] {
      store.save(key, Some(key.as_bytes()));
    }
    store.erase();
    assert!(store.is_empty());
    assert_eq!(store.load("a"), None);
  }

  #[test]
  fn test_zero_capacity_is_clamped() {
    let store = MemoryStore::new(0);
    assert_eq!(store.capacity(), 1);
  }
}
