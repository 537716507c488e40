//! Durable key-value mirror for offline support.
//!
//! This module provides a versioned store partitioned into named collections:
//! - Each collection declares a key path; records are upserted by that key
//! - Full refreshes replace a collection inside a single transaction
//! - Pending writes live in their own collections until they are replayed

mod storage;
mod traits;

pub use storage::SqliteStore;
pub use traits::{DisabledStore, Storage};

/// Named partitions of the persistent store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
  Restaurants,
  Reviews,
  PendingReviews,
  PendingStatusUpdates,
  /// Reviews handed to the background worker's sync event
  ReviewsToSend,
}

impl Collection {
  pub const ALL: [Collection; 5] = [
    Collection::Restaurants,
    Collection::Reviews,
    Collection::PendingReviews,
    Collection::PendingStatusUpdates,
    Collection::ReviewsToSend,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      Collection::Restaurants => "restaurants",
      Collection::Reviews => "reviews",
      Collection::PendingReviews => "pending-reviews",
      Collection::PendingStatusUpdates => "pending-status-updates",
      Collection::ReviewsToSend => "reviews-to-send",
    }
  }

  /// Field of the stored record that acts as its primary key.
  pub fn key_path(&self) -> &'static str {
    match self {
      Collection::Restaurants | Collection::Reviews | Collection::PendingReviews => "id",
      Collection::PendingStatusUpdates | Collection::ReviewsToSend => "restaurant_id",
    }
  }
}

impl std::fmt::Display for Collection {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}
