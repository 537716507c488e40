//! Error taxonomy shared by the store, gateway, sync engine and worker.

use thiserror::Error;

use crate::api::types::RestaurantId;

#[derive(Error, Debug)]
pub enum Error {
  /// Transport failure, non-2xx status or an undecodable response body.
  #[error("Network error: {0}")]
  Network(String),

  /// The persistent store could not be opened, read or written.
  #[error("Storage unavailable: {0}")]
  StorageUnavailable(String),

  /// Both the network and the local cache came up empty.
  #[error("No data available from network or cache")]
  DataUnavailable,

  #[error("Restaurant {0} not found")]
  NotFound(RestaurantId),

  /// A record was written to a collection without its key-path field.
  #[error("Record for collection '{collection}' has no '{key_path}' field")]
  MissingKey {
    collection: &'static str,
    key_path: &'static str,
  },

  #[error("Invalid input: {0}")]
  InvalidInput(String),

  /// Non-fatal: the interception layer could not store a response.
  #[error("Failed to cache {url}: {reason}")]
  CachePopulation { url: String, reason: String },
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 200;

impl Error {
  /// Build a network error from a non-2xx response.
  pub fn from_status(status: reqwest::StatusCode, url: &str, body: &str) -> Self {
    let body = if body.len() <= MAX_ERROR_BODY_LENGTH {
      body.to_string()
    } else {
      let mut end = MAX_ERROR_BODY_LENGTH;
      while !body.is_char_boundary(end) {
        end -= 1;
      }
      format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    };
    Error::Network(format!("{} returned {}: {}", url, status, body))
  }

  /// Whether this failure came from the network side.
  pub fn is_network(&self) -> bool {
    matches!(self, Error::Network(_))
  }
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    Error::Network(e.to_string())
  }
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self {
    Error::StorageUnavailable(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, Error>;
