//! Storage trait and the disabled backend.

use serde::{de::DeserializeOwned, Serialize};

use super::Collection;
use crate::error::{Error, Result};

/// Trait for persistent store backends.
pub trait Storage: Send + Sync {
  /// Upsert a single record by its key path.
  fn put<T: Serialize>(&self, collection: Collection, record: &T) -> Result<()>;

  /// Upsert many records in one transaction.
  fn put_all<T: Serialize>(&self, collection: Collection, records: &[T]) -> Result<()>;

  /// All records of a collection, in insertion order.
  fn get_all<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>>;

  /// A single record by key.
  fn get<T: DeserializeOwned>(&self, collection: Collection, key: &str) -> Result<Option<T>>;

  /// Delete a single record by key. Deleting a missing key is not an error.
  fn delete(&self, collection: Collection, key: &str) -> Result<()>;

  /// Delete every record of a collection.
  fn clear(&self, collection: Collection) -> Result<()>;

  /// Clear the collection and write `records` as one atomic step.
  ///
  /// Concurrent readers see either the old contents or the new ones, never
  /// an empty or half-written collection.
  fn replace_all<T: Serialize>(&self, collection: Collection, records: &[T]) -> Result<()>;
}

/// Storage used when persistence cannot be opened.
/// Every operation fails with `StorageUnavailable`.
pub struct DisabledStore {
  reason: String,
}

impl DisabledStore {
  pub fn new(reason: impl Into<String>) -> Self {
    Self {
      reason: reason.into(),
    }
  }

  fn unavailable<T>(&self) -> Result<T> {
    Err(Error::StorageUnavailable(self.reason.clone()))
  }
}

impl Storage for DisabledStore {
  fn put<T: Serialize>(&self, _collection: Collection, _record: &T) -> Result<()> {
    self.unavailable()
  }

  fn put_all<T: Serialize>(&self, _collection: Collection, _records: &[T]) -> Result<()> {
    self.unavailable()
  }

  fn get_all<T: DeserializeOwned>(&self, _collection: Collection) -> Result<Vec<T>> {
    self.unavailable()
  }

  fn get<T: DeserializeOwned>(&self, _collection: Collection, _key: &str) -> Result<Option<T>> {
    self.unavailable()
  }

  fn delete(&self, _collection: Collection, _key: &str) -> Result<()> {
    self.unavailable()
  }

  fn clear(&self, _collection: Collection) -> Result<()> {
    self.unavailable()
  }

  fn replace_all<T: Serialize>(&self, _collection: Collection, _records: &[T]) -> Result<()> {
    self.unavailable()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_disabled_store_rejects_everything() {
    let store = DisabledStore::new("private browsing");
    assert!(matches!(
      store.get_all::<serde_json::Value>(Collection::Restaurants),
      Err(Error::StorageUnavailable(reason)) if reason == "private browsing"
    ));
    assert!(store.clear(Collection::Reviews).is_err());
    assert!(store
      .put(Collection::Reviews, &serde_json::json!({"id": 1}))
      .is_err());
  }
}
