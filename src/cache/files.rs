//! File-per-key durable tier.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, info, warn};

use super::traits::{CacheStore, StoreLifecycle};

/// Initialization flag guarded by the store-wide lock.
struct DiskState {
  ready: bool,
}

struct Shared {
  state: Mutex<DiskState>,
  initialized: Condvar,
}

/// Durable tier storing one file per key under a root directory.
///
/// File names are the SHA-256 of the key, fanned out by their first two hex
/// digits. Every file operation, erase included, runs under one store-wide
/// lock, and waits for the background initialization to finish first.
pub struct FileStore {
  root: PathBuf,
  shared: Arc<Shared>,
}

/// Pending preparation of a [`FileStore`] directory.
///
/// Every operation on the store blocks until [`DiskInit::run`] has finished.
pub struct DiskInit {
  root: PathBuf,
  shared: Arc<Shared>,
}

impl DiskInit {
  /// Create the root directory and release the store.
  pub fn run(self) {
    if let Err(e) = fs::create_dir_all(&self.root) {
      warn!("Failed to create cache directory {}: {}", self.root.display(), e);
    } else {
      debug!(root = %self.root.display(), "disk tier ready");
    }

    let mut state = self
      .shared
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    state.ready = true;
    self.shared.initialized.notify_all();
  }
}

impl FileStore {
  /// Open a store rooted at `root`. The directory is prepared on a
  /// background thread; this call returns immediately.
  pub fn open(root: impl Into<PathBuf>) -> Self {
    let (store, init) = Self::deferred(root);
    let fallback = DiskInit {
      root: store.root.clone(),
      shared: Arc::clone(&store.shared),
    };

    let spawned = thread::Builder::new()
      .name("restcache-disk-init".to_string())
      .spawn(move || init.run());

    if let Err(e) = spawned {
      warn!("Failed to spawn disk init thread, initializing inline: {}", e);
      fallback.run();
    }

    store
  }

  /// Build a store whose initialization is left to the caller. The store
  /// is unusable until the returned [`DiskInit`] has run.
  pub fn deferred(root: impl Into<PathBuf>) -> (Self, DiskInit) {
    let root = root.into();
    let shared = Arc::new(Shared {
      state: Mutex::new(DiskState { ready: false }),
      initialized: Condvar::new(),
    });

    let init = DiskInit {
      root: root.clone(),
      shared: Arc::clone(&shared),
    };
    (Self { root, shared }, init)
  }

  /// Root directory of this store.
  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Path of the file holding `key`.
  fn entry_path(&self, key: &str) -> PathBuf {
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    self.root.join(&digest[..2]).join(digest)
  }

  /// Acquire the store-wide lock, blocking until initialization completed.
  fn lock(&self) -> MutexGuard<'_, DiskState> {
    let guard = self
      .shared
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    self
      .shared
      .initialized
      .wait_while(guard, |state| !state.ready)
      .unwrap_or_else(PoisonError::into_inner)
  }

  fn write_entry(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    // Write aside and rename so readers never see a partial file
    let staging = path.with_extension("tmp");
    fs::write(&staging, bytes)?;
    fs::rename(&staging, path)
  }
}

/// Recursively remove everything below `dir`, keeping `dir` itself.
fn remove_contents(dir: &Path) -> io::Result<()> {
  for entry in fs::read_dir(dir)? {
    let path = entry?.path();
    if path.is_dir() {
      remove_contents(&path)?;
      fs::remove_dir(&path)?;
    } else {
      fs::remove_file(&path)?;
    }
  }
  Ok(())
}

impl CacheStore for FileStore {
  fn load(&self, key: &str) -> Option<Vec<u8>> {
    let path = self.entry_path(key);
    let _guard = self.lock();

    match fs::read(&path) {
      Ok(bytes) => Some(bytes),
      Err(e) if e.kind() == ErrorKind::NotFound => None,
      Err(e) => {
        warn!("Failed to read cache file {}: {}", path.display(), e);
        None
      }
    }
  }

  fn save(&self, key: &str, value: Option<&[u8]>) {
    let Some(bytes) = value else {
      self.delete(key);
      return;
    };

    let path = self.entry_path(key);
    let _guard = self.lock();

    if let Err(e) = self.write_entry(&path, bytes) {
      warn!("Failed to write cache file {}: {}", path.display(), e);
    }
  }

  fn delete(&self, key: &str) {
    let path = self.entry_path(key);
    let _guard = self.lock();

    match fs::remove_file(&path) {
      Ok(()) => {}
      Err(e) if e.kind() == ErrorKind::NotFound => {}
      Err(e) => warn!("Failed to delete cache file {}: {}", path.display(), e),
    }
  }
}

impl StoreLifecycle for FileStore {
  fn erase(&self) {
    let _guard = self.lock();

    if !self.root.is_dir() {
      return;
    }

    if let Err(e) = remove_contents(&self.root) {
      warn!("Failed to erase cache directory {}: {}", self.root.display(), e);
      return;
    }

    // Only succeeds when the directory is now empty
    if let Err(e) = fs::remove_dir(&self.root) {
      debug!("Cache directory {} kept: {}", self.root.display(), e);
    }

    info!(root = %self.root.display(), "disk tier erased");
  }
}
