//! Key-value storage trait and SQLite implementation.
//!
//! The store promises per-key atomic get/put/delete and nothing more — no
//! cross-key transactions. Every snapshot write is self-contained and fully
//! replaces the previous value for its key, so that is sufficient.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use crate::error::CacheError;

/// Storage backend for the caches. Entries carry a TTL; expired entries
/// read as absent.
#[async_trait]
pub trait KvStore: Send + Sync {
  /// Fetch the value for a key, honoring its TTL.
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

  /// Replace the value for a key, expiring after `ttl`.
  async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

  /// Remove a key. Removing an absent key is not an error.
  async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Schema for the cache table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_cache (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_kv_cache_expires ON kv_cache(expires_at);
"#;

/// SQLite-backed store. The connection is shared behind a mutex; individual
/// statements are the atomicity unit, which matches the per-key contract.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open_default() -> Result<Self, CacheError> {
    let path = Self::default_path();
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    Self::open(&path)
  }

  /// Open or create the store at the given path.
  pub fn open(path: &Path) -> Result<Self, CacheError> {
    let conn = Connection::open(path)?;
    Self::from_connection(conn)
  }

  /// Open a process-local in-memory store.
  pub fn in_memory() -> Result<Self, CacheError> {
    let conn = Connection::open_in_memory()?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self, CacheError> {
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn default_path() -> std::path::PathBuf {
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .unwrap_or_else(|| std::path::PathBuf::from("."))
      .join("clocksync")
      .join("cache.db")
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
    self.conn.lock().map_err(|_| CacheError::Poisoned)
  }
}

#[async_trait]
impl KvStore for SqliteStore {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
    let conn = self.lock()?;
    let now = Utc::now().timestamp();

    let row: Option<(Vec<u8>, i64)> = conn
      .query_row(
        "SELECT value, expires_at FROM kv_cache WHERE key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;

    match row {
      Some((value, expires_at)) if expires_at > now => Ok(Some(value)),
      // Expired entries read as absent; the row is purged on the next put.
      _ => Ok(None),
    }
  }

  async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
    let conn = self.lock()?;
    let now = Utc::now().timestamp();
    let expires_at = now + ttl.num_seconds();

    conn.execute("DELETE FROM kv_cache WHERE expires_at <= ?", params![now])?;
    conn.execute(
      "INSERT OR REPLACE INTO kv_cache (key, value, expires_at) VALUES (?, ?, ?)",
      params![key, value, expires_at],
    )?;

    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<(), CacheError> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM kv_cache WHERE key = ?", params![key])?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn put_get_delete_round_trip() {
    let store = SqliteStore::in_memory().unwrap();

    store
      .put("k", b"value", Duration::seconds(60))
      .await
      .unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some(b"value".to_vec()));

    store.delete("k").await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), None);
  }

  #[tokio::test]
  async fn put_replaces_the_previous_value() {
    let store = SqliteStore::in_memory().unwrap();

    store.put("k", b"old", Duration::seconds(60)).await.unwrap();
    store.put("k", b"new", Duration::seconds(60)).await.unwrap();

    assert_eq!(store.get("k").await.unwrap(), Some(b"new".to_vec()));
  }

  #[tokio::test]
  async fn expired_entries_read_as_absent() {
    let store = SqliteStore::in_memory().unwrap();

    store.put("k", b"value", Duration::seconds(0)).await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), None);
  }

  #[tokio::test]
  async fn live_entries_survive_until_the_ttl() {
    let store = SqliteStore::in_memory().unwrap();

    store.put("k", b"value", Duration::seconds(60)).await.unwrap();
    assert!(store.get("k").await.unwrap().is_some());
  }

  #[tokio::test]
  async fn sixty_second_ttl_boundary() {
    let store = SqliteStore::in_memory().unwrap();
    store.put("k", b"value", Duration::seconds(60)).await.unwrap();

    let age = |secs: i64| {
      let conn = store.conn.lock().unwrap();
      conn
        .execute("UPDATE kv_cache SET expires_at = expires_at - ?", params![secs])
        .unwrap();
    };

    // 59 seconds in: still readable.
    age(59);
    assert!(store.get("k").await.unwrap().is_some());

    // 61 seconds in: absent.
    age(2);
    assert_eq!(store.get("k").await.unwrap(), None);
  }

  #[tokio::test]
  async fn deleting_an_absent_key_is_fine() {
    let store = SqliteStore::in_memory().unwrap();
    store.delete("missing").await.unwrap();
  }

  #[tokio::test]
  async fn store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    {
      let store = SqliteStore::open(&path).unwrap();
      store.put("k", b"value", Duration::seconds(60)).await.unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some(b"value".to_vec()));
  }
}
