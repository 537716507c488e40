//! Queued writes and the outcomes of delivering them.

use serde::{Deserialize, Serialize};

use crate::api::RestaurantId;

/// A favorite toggle the server has not acknowledged yet.
/// Keyed by `restaurant_id`: only the latest toggle per restaurant is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingStatusUpdate {
  pub restaurant_id: RestaurantId,
  pub is_favorite: bool,
}

/// What happened to a single write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
  /// The server acknowledged the write
  Delivered,
  /// The network write failed and the write is waiting in its pending queue
  Queued,
  /// The network write failed and queueing it failed too
  Dropped,
}

/// Tally for one pending queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueReport {
  pub delivered: usize,
  pub requeued: usize,
  pub dropped: usize,
}

impl QueueReport {
  pub(crate) fn record(&mut self, outcome: WriteOutcome) {
    match outcome {
      WriteOutcome::Delivered => self.delivered += 1,
      WriteOutcome::Queued => self.requeued += 1,
      WriteOutcome::Dropped => self.dropped += 1,
    }
  }

  pub fn attempted(&self) -> usize {
    self.delivered + self.requeued + self.dropped
  }
}

/// Result of draining both pending queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
  pub reviews: QueueReport,
  pub status_updates: QueueReport,
}

impl DrainReport {
  pub fn is_empty(&self) -> bool {
    self.reviews.attempted() == 0 && self.status_updates.attempted() == 0
  }

  /// Entries still waiting after the drain.
  pub fn remaining(&self) -> usize {
    self.reviews.requeued + self.status_updates.requeued
  }
}
