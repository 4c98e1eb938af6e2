use super::traits::{CacheStore, StoreLifecycle};

/// Store implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStore;

impl CacheStore for NoopStore {
  fn load(&self, _key: &str) -> Option<Vec<u8>> {
    None // Always miss
  }

  fn save(&self, _key: &str, _value: Option<&[u8]>) {
    // Discard
  }

  fn delete(&self, _key: &str) {}
}

impl StoreLifecycle for NoopStore {
  fn erase(&self) {}
}
