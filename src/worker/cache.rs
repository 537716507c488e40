//! Named HTTP response cache backed by SQLite.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use super::fetcher::{CachedResponse, Request};
use crate::error::{Error, Result};

const RESPONSE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS responses (
    cache_name TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, request_key)
);
"#;

/// Whole responses keyed by (method, URL), partitioned by cache name so a new
/// cache version starts empty.
pub struct ResponseCache {
  conn: Mutex<Connection>,
  name: String,
}

impl ResponseCache {
  pub fn open(path: &Path, name: &str) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        Error::StorageUnavailable(format!(
          "Failed to create cache directory {}: {}",
          parent.display(),
          e
        ))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      Error::StorageUnavailable(format!(
        "Failed to open response cache at {}: {}",
        path.display(),
        e
      ))
    })?;
    // Several processes (proxy, CLI) share the file
    conn.busy_timeout(Duration::from_secs(5))?;
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    Self::init(conn, name)
  }

  pub fn open_in_memory(name: &str) -> Result<Self> {
    Self::init(Connection::open_in_memory()?, name)
  }

  /// File holding every response cache under `data_dir`.
  pub fn path_for(data_dir: &Path) -> PathBuf {
    data_dir.join("responses.db")
  }

  fn init(conn: Connection, name: &str) -> Result<Self> {
    conn.execute_batch(RESPONSE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
      name: name.to_string(),
    })
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::StorageUnavailable(format!("Lock poisoned: {}", e)))
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Exact match on method and URL.
  pub fn lookup(&self, request: &Request) -> Result<Option<CachedResponse>> {
    let conn = self.conn()?;
    let row = conn
      .query_row(
        "SELECT status, headers, body FROM responses
         WHERE cache_name = ?1 AND request_key = ?2",
        params![self.name, request.cache_key()],
        |row| {
          Ok((
            row.get::<_, u16>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Vec<u8>>(2)?,
          ))
        },
      )
      .optional()?;

    match row {
      Some((status, headers, body)) => {
        let headers = serde_json::from_str(&headers)
          .map_err(|e| Error::StorageUnavailable(format!("Corrupt cached headers: {}", e)))?;
        Ok(Some(CachedResponse {
          status,
          headers,
          body,
        }))
      }
      None => Ok(None),
    }
  }

  /// Store a response, replacing any earlier one for the same request.
  pub fn store(&self, request: &Request, response: &CachedResponse) -> Result<()> {
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| Error::StorageUnavailable(format!("Failed to serialize headers: {}", e)))?;

    let conn = self.conn()?;
    conn.execute(
      "INSERT OR REPLACE INTO responses
         (cache_name, request_key, method, url, status, headers, body, cached_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))",
      params![
        self.name,
        request.cache_key(),
        request.method.to_ascii_uppercase(),
        request.url,
        response.status,
        headers,
        response.body,
      ],
    )?;
    Ok(())
  }

  /// URLs held by this cache, oldest first.
  pub fn urls(&self) -> Result<Vec<String>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare(
      "SELECT url FROM responses WHERE cache_name = ?1 ORDER BY cached_at, rowid",
    )?;
    let urls = stmt
      .query_map(params![self.name], |row| row.get(0))?
      .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(urls)
  }

  /// Drop every cache except this one. Returns how many responses went.
  pub fn purge_other_caches(&self) -> Result<usize> {
    let conn = self.conn()?;
    Ok(conn.execute(
      "DELETE FROM responses WHERE cache_name != ?1",
      params![self.name],
    )?)
  }
}
