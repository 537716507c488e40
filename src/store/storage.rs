//! SQLite implementation of the persistent store.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use super::traits::Storage;
use super::Collection;
use crate::error::{Error, Result};

/// Schema version this build creates and understands.
pub const SCHEMA_VERSION: u32 = 1;

/// Migrations indexed by the version they upgrade *from*.
const MIGRATIONS: &[&str] = &[SCHEMA_V1];

const SCHEMA_V1: &str = r#"
-- Declared collections and the record field used as their key
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    key_path TEXT NOT NULL
);

-- Records of every collection, serialized as JSON
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    record_key TEXT NOT NULL,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (collection, record_key)
);
"#;

const UPSERT_RECORD: &str = "INSERT INTO records (collection, record_key, data, stored_at)
   VALUES (?1, ?2, ?3, datetime('now'))
   ON CONFLICT (collection, record_key)
   DO UPDATE SET data = excluded.data, stored_at = excluded.stored_at";

/// SQLite-based persistent store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create a store file, upgrading it to `schema_version`.
  ///
  /// Opening an existing store at the same version is a no-op apart from
  /// registering any collections the file does not know yet.
  pub fn open(path: &Path, schema_version: u32) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        Error::StorageUnavailable(format!(
          "Failed to create store directory {}: {}",
          parent.display(),
          e
        ))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      Error::StorageUnavailable(format!(
        "Failed to open store at {}: {}",
        path.display(),
        e
      ))
    })?;
    conn.busy_timeout(Duration::from_secs(5))?;
    // WAL lets the worker read while the engine writes.
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;

    Self::init(conn, schema_version)
  }

  /// Open the store named `name` inside `data_dir` at the current schema.
  pub fn open_named(data_dir: &Path, name: &str) -> Result<Self> {
    Self::open(&Self::path_for(data_dir, name), SCHEMA_VERSION)
  }

  /// Store that lives only as long as the process.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()?;
    Self::init(conn, SCHEMA_VERSION)
  }

  /// File backing the store named `name`.
  pub fn path_for(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(format!("{}.db", name))
  }

  fn init(mut conn: Connection, schema_version: u32) -> Result<Self> {
    migrate(&mut conn, schema_version)?;

    let tx = conn.transaction()?;
    for collection in Collection::ALL {
      tx.execute(
        "INSERT OR IGNORE INTO collections (name, key_path) VALUES (?1, ?2)",
        params![collection.name(), collection.key_path()],
      )?;
    }
    tx.commit()?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::StorageUnavailable(format!("Lock poisoned: {}", e)))
  }

  /// Collections registered in the store file with their key paths.
  pub fn collections(&self) -> Result<Vec<(String, String)>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare("SELECT name, key_path FROM collections ORDER BY name")?;
    let rows = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
  }

  /// Schema version recorded in the store file.
  pub fn schema_version(&self) -> Result<u32> {
    let conn = self.conn()?;
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
  }
}

/// Bring the schema from its recorded version up to `target`.
fn migrate(conn: &mut Connection, target: u32) -> Result<()> {
  let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

  if target as usize > MIGRATIONS.len() {
    return Err(Error::StorageUnavailable(format!(
      "Schema version {} is not supported (latest is {})",
      target,
      MIGRATIONS.len()
    )));
  }
  if current > target {
    return Err(Error::StorageUnavailable(format!(
      "Store is at schema version {}, newer than {}",
      current, target
    )));
  }

  for (from, sql) in MIGRATIONS
    .iter()
    .enumerate()
    .skip(current as usize)
    .take((target - current) as usize)
  {
    debug!(from, to = from + 1, "Upgrading store schema");
    let tx = conn.transaction()?;
    tx.execute_batch(sql)?;
    tx.pragma_update(None, "user_version", (from + 1) as i64)?;
    tx.commit()?;
  }

  Ok(())
}

/// Serialize a record and pull its key out of the collection's key path.
fn encode_record<T: Serialize>(collection: Collection, record: &T) -> Result<(String, Vec<u8>)> {
  let value = serde_json::to_value(record)
    .map_err(|e| Error::StorageUnavailable(format!("Failed to serialize record: {}", e)))?;

  let key = match value.get(collection.key_path()) {
    Some(Value::Number(n)) => n.to_string(),
    Some(Value::String(s)) if !s.is_empty() => s.clone(),
    _ => {
      return Err(Error::MissingKey {
        collection: collection.name(),
        key_path: collection.key_path(),
      })
    }
  };

  let data = serde_json::to_vec(&value)
    .map_err(|e| Error::StorageUnavailable(format!("Failed to serialize record: {}", e)))?;
  Ok((key, data))
}

fn upsert_all<T: Serialize>(tx: &Transaction<'_>, collection: Collection, records: &[T]) -> Result<()> {
  let mut stmt = tx.prepare(UPSERT_RECORD)?;
  for record in records {
    let (key, data) = encode_record(collection, record)?;
    stmt.execute(params![collection.name(), key, data])?;
  }
  Ok(())
}

impl Storage for SqliteStore {
  fn put<T: Serialize>(&self, collection: Collection, record: &T) -> Result<()> {
    let (key, data) = encode_record(collection, record)?;
    let conn = self.conn()?;
    conn.execute(UPSERT_RECORD, params![collection.name(), key, data])?;
    Ok(())
  }

  fn put_all<T: Serialize>(&self, collection: Collection, records: &[T]) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;
    upsert_all(&tx, collection, records)?;
    tx.commit()?;
    Ok(())
  }

  fn get_all<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare(
      "SELECT record_key, data FROM records
       WHERE collection = ?1
       ORDER BY rowid",
    )?;

    let rows = stmt
      .query_map(params![collection.name()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    let records = rows
      .into_iter()
      .filter_map(|(key, data)| match serde_json::from_slice(&data) {
        Ok(record) => Some(record),
        Err(e) => {
          debug!(%collection, key = %key, error = %e, "Skipping undecodable record");
          None
        }
      })
      .collect();

    Ok(records)
  }

  fn get<T: DeserializeOwned>(&self, collection: Collection, key: &str) -> Result<Option<T>> {
    let conn = self.conn()?;
    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM records WHERE collection = ?1 AND record_key = ?2",
        params![collection.name(), key],
        |row| row.get(0),
      )
      .optional()?;

    match data {
      Some(data) => serde_json::from_slice(&data).map(Some).map_err(|e| {
        Error::StorageUnavailable(format!("Failed to decode {} record {}: {}", collection, key, e))
      }),
      None => Ok(None),
    }
  }

  fn delete(&self, collection: Collection, key: &str) -> Result<()> {
    let conn = self.conn()?;
    conn.execute(
      "DELETE FROM records WHERE collection = ?1 AND record_key = ?2",
      params![collection.name(), key],
    )?;
    Ok(())
  }

  fn clear(&self, collection: Collection) -> Result<()> {
    let conn = self.conn()?;
    conn.execute(
      "DELETE FROM records WHERE collection = ?1",
      params![collection.name()],
    )?;
    Ok(())
  }

  fn replace_all<T: Serialize>(&self, collection: Collection, records: &[T]) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;
    tx.execute(
      "DELETE FROM records WHERE collection = ?1",
      params![collection.name()],
    )?;
    upsert_all(&tx, collection, records)?;
    tx.commit()?;
    Ok(())
  }
}
