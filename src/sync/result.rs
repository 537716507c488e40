//! Result types returned by the sync engine.

/// Data returned from a read-through, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: DataSource,
}

impl<T> Fetched<T> {
  /// Fresh data that was just mirrored from the network.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: DataSource::Network,
    }
  }

  /// Stale data served from the local mirror (offline mode).
  pub fn from_cache(data: T) -> Self {
    Self {
      data,
      source: DataSource::Cache,
    }
  }

  pub fn is_offline(&self) -> bool {
    self.source == DataSource::Cache
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
    Fetched {
      data: f(self.data),
      source: self.source,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
  /// Fresh from the network, round-tripped through the store
  Network,
  /// Network unavailable, serving the last mirrored snapshot
  Cache,
}
