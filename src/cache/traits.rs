//! Core traits for the caching system.

/// Byte-oriented key/value store.
///
/// Keys are canonical resource keys (see [`crate::request::ResourceFilter`]).
/// Implementations never fail through this contract: storage errors are
/// logged and reported as a miss (for `load`) or swallowed (for mutations).
pub trait CacheStore: Send + Sync {
  /// Load the bytes stored for `key`, or `None` on a miss.
  fn load(&self, key: &str) -> Option<Vec<u8>>;

  /// Store `value` for `key`. `None` removes whatever was stored.
  fn save(&self, key: &str, value: Option<&[u8]>);

  /// Remove the entry for `key`.
  fn delete(&self, key: &str);
}

/// Destructive reset of a whole store.
pub trait StoreLifecycle: Send + Sync {
  /// Remove every entry. Blocks until any pending initialization is done and
  /// excludes all other access to the store while running.
  fn erase(&self);
}

/// Full cache contract plus erase.
pub trait ManagedStore: CacheStore + StoreLifecycle {}

impl<T: CacheStore + StoreLifecycle + ?Sized> ManagedStore for T {}
