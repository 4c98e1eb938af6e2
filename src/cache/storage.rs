//! SQLite durable tier.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

use super::traits::{CacheStore, StoreLifecycle};

/// SQLite-based durable tier.
///
/// The connection mutex doubles as the store-wide lock, so erase never
/// interleaves with a single read or write.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) a database file at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn conn(&self) -> MutexGuard<'_, Connection> {
    self.conn.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Schema for the cache table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl CacheStore for SqliteStorage {
  fn load(&self, key: &str) -> Option<Vec<u8>> {
    let conn = self.conn();

    conn
      .query_row(
        "SELECT data FROM cache_entries WHERE cache_key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .unwrap_or_else(|e| {
        warn!("Failed to load cache entry {}: {}", key, e);
        None
      })
  }

  fn save(&self, key: &str, value: Option<&[u8]>) {
    let Some(data) = value else {
      self.delete(key);
      return;
    };

    let result = self.conn().execute(
      "INSERT OR REPLACE INTO cache_entries (cache_key, data, cached_at)
       VALUES (?, ?, datetime('now'))",
      params![key, data],
    );

    if let Err(e) = result {
      warn!("Failed to store cache entry {}: {}", key, e);
    }
  }

  fn delete(&self, key: &str) {
    let result = self
      .conn()
      .execute("DELETE FROM cache_entries WHERE cache_key = ?", params![key]);

    if let Err(e) = result {
      warn!("Failed to delete cache entry {}: {}", key, e);
    }
  }
}

impl StoreLifecycle for SqliteStorage {
  fn erase(&self) {
    let conn = self.conn();

    // The database file stays open, so reclaim its pages instead of removing it
    match conn.execute_batch("DELETE FROM cache_entries; VACUUM;") {
      Ok(()) => info!("sqlite tier erased"),
      Err(e) => warn!("Failed to erase cache database: {}", e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_save_load_delete() {
    let storage = SqliteStorage::open_in_memory().unwrap();

    assert_eq!(storage.load("a"), None);

    storage.save("a", Some(b"first"));
    storage.save("a", Some(b"second"));
    assert_eq!(storage.load("a"), Some(b"second".to_vec()));

    storage.delete("a");
    assert_eq!(storage.load("a"), None);
  }

  #[test]
  fn test_save_none_removes_row() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.save("a", Some(b"x"));
    storage.save("a", None);
    assert_eq!(storage.load("a"), None);
  }

  #[test]
  fn test_erase_clears_table() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.save("a", Some(b"1"));
    storage.save("b", Some(b"2"));

    storage.erase();

    assert_eq!(storage.load("a"), None);
    assert_eq!(storage.load("b"), None);
  }

  #[test]
  fn test_open_creates_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    let storage = SqliteStorage::open(&path).unwrap();
    storage.save("k", Some(b"v"));

    assert!(path.exists());
    assert_eq!(storage.load("k"), Some(b"v".to_vec()));
  }
}
