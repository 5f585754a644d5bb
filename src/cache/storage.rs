//! Durable per-session storage for long-lived reference data.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A persisted record as stored: serialized JSON plus its fetch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
  pub data: Vec<u8>,
  /// Epoch milliseconds
  pub fetched_at: i64,
}

/// Trait for session storage backends.
pub trait SessionStorage: Send + Sync {
  /// Read the record stored under `key`.
  fn read(&self, key: &str) -> Result<Option<StoredRecord>>;

  /// Store (or replace) the record under `key`.
  fn write(&self, key: &str, record: &StoredRecord) -> Result<()>;

  /// Remove the record under `key`, if any.
  fn remove(&self, key: &str) -> Result<()>;

  /// Remove every record fetched before `cutoff` (epoch ms). Returns the
  /// number of records removed.
  fn purge_before(&self, cutoff: i64) -> Result<usize>;
}

/// Storage implementation that doesn't persist anything.
/// Used when persistence is disabled - all operations are no-ops.
pub struct NoopStorage;

impl SessionStorage for NoopStorage {
  fn read(&self, _key: &str) -> Result<Option<StoredRecord>> {
    Ok(None) // Always miss
  }

  fn write(&self, _key: &str, _record: &StoredRecord) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn purge_before(&self, _cutoff: i64) -> Result<usize> {
    Ok(0)
  }
}

/// SQLite-based session storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

/// Schema for the session cache table.
const SESSION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS session_cache (
    cache_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    fetched_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_session_cache_fetched
    ON session_cache(fetched_at);
"#;

impl SqliteStorage {
  /// Open the storage file for a named session at the default location.
  pub fn open(session: &str) -> Result<Self> {
    let path = Self::default_path(session)?;
    Self::open_at(&path)
  }

  /// Open (or create) the storage file at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create session directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open session storage at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Storage that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory session storage: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default storage path for a session.
  pub fn default_path(session: &str) -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(
      data_dir
        .join("querycache")
        .join("sessions")
        .join(format!("{}.db", sanitize_name(session))),
    )
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SESSION_SCHEMA)
      .map_err(|e| eyre!("Failed to run session storage migrations: {}", e))?;

    Ok(())
  }
}

impl SessionStorage for SqliteStorage {
  fn read(&self, key: &str) -> Result<Option<StoredRecord>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT data, fetched_at FROM session_cache WHERE cache_key = ?",
        params![key],
        |row| {
          Ok(StoredRecord {
            data: row.get(0)?,
            fetched_at: row.get(1)?,
          })
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to read session record {}: {}", key, e))
  }

  fn write(&self, key: &str, record: &StoredRecord) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO session_cache (cache_key, data, fetched_at) VALUES (?, ?, ?)",
        params![key, record.data, record.fetched_at],
      )
      .map_err(|e| eyre!("Failed to store session record {}: {}", key, e))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM session_cache WHERE cache_key = ?",
        params![key],
      )
      .map_err(|e| eyre!("Failed to remove session record {}: {}", key, e))?;

    Ok(())
  }

  fn purge_before(&self, cutoff: i64) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM session_cache WHERE fetched_at < ?",
        params![cutoff],
      )
      .map_err(|e| eyre!("Failed to purge session records: {}", e))
  }
}

/// Replace characters that don't belong in a file name.
fn sanitize_name(name: &str) -> String {
  name
    .chars()
    .map(|c| match c {
      '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
      _ => c,
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn record(data: &str, fetched_at: i64) -> StoredRecord {
    StoredRecord {
      data: data.as_bytes().to_vec(),
      fetched_at,
    }
  }

  #[test]
  fn test_write_read_remove() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    assert_eq!(storage.read("country:countries").unwrap(), None);

    storage
      .write("country:countries", &record("[1]", 1000))
      .unwrap();
    storage
      .write("country:countries", &record("[1,2]", 2000))
      .unwrap();
    assert_eq!(
      storage.read("country:countries").unwrap(),
      Some(record("[1,2]", 2000))
    );

    storage.remove("country:countries").unwrap();
    assert_eq!(storage.read("country:countries").unwrap(), None);
  }

  #[test]
  fn test_purge_before() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.write("old", &record("[]", 1_000)).unwrap();
    storage.write("new", &record("[]", 9_000)).unwrap();

    assert_eq!(storage.purge_before(5_000).unwrap(), 1);
    assert!(storage.read("old").unwrap().is_none());
    assert!(storage.read("new").unwrap().is_some());
  }

  #[test]
  fn test_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sessions").join("s1.db");

    SqliteStorage::open_at(&path)
      .unwrap()
      .write("k", &record("{}", 42))
      .unwrap();

    let reopened = SqliteStorage::open_at(&path).unwrap();
    assert_eq!(reopened.read("k").unwrap(), Some(record("{}", 42)));
  }

  #[test]
  fn test_noop_storage() {
    let storage = NoopStorage;
    storage.write("k", &record("{}", 1)).unwrap();
    assert_eq!(storage.read("k").unwrap(), None);
  }

  #[test]
  fn test_sanitize_session_name() {
    assert_eq!(sanitize_name("default"), "default");
    assert_eq!(sanitize_name("tab:1/2"), "tab_1_2");
  }
}
