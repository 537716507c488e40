//! Sync engine that orchestrates the remote gateway and the persistent store.

use std::future::Future;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};

use super::pending::{DrainReport, PendingStatusUpdate, QueueReport, WriteOutcome};
use super::result::Fetched;
use crate::api::{RemoteGateway, Restaurant, RestaurantId, Review};
use crate::error::{Error, Result};
use crate::store::{Collection, Storage};

/// Read-through cache for restaurants and reviews with buffered writes.
///
/// Reads are network-first: a successful fetch replaces the mirrored
/// collection and the caller gets the mirror back; a failed fetch serves
/// whatever the mirror holds. Writes are attempted once and queued in the
/// store on failure until `drain` replays them.
pub struct SyncEngine<G: RemoteGateway, S: Storage> {
  gateway: Arc<G>,
  store: Arc<S>,
  /// Serializes drains so two reconnect signals don't double-send
  drain_lock: Arc<tokio::sync::Mutex<()>>,
}

impl<G: RemoteGateway, S: Storage> SyncEngine<G, S> {
  pub fn new(gateway: G, store: S) -> Self {
    Self::with_shared(Arc::new(gateway), Arc::new(store))
  }

  /// Build an engine over a gateway and store shared with other components.
  pub fn with_shared(gateway: Arc<G>, store: Arc<S>) -> Self {
    Self {
      gateway,
      store,
      drain_lock: Arc::new(tokio::sync::Mutex::new(())),
    }
  }

  pub fn gateway(&self) -> &Arc<G> {
    &self.gateway
  }

  pub fn store(&self) -> &Arc<S> {
    &self.store
  }

  /// Fetch all restaurants, network first.
  pub async fn fetch_restaurants(&self) -> Result<Fetched<Vec<Restaurant>>> {
    self
      .read_through(
        Collection::Restaurants,
        || self.gateway.fetch_restaurants(),
        |_| true,
      )
      .await
  }

  /// Fetch the reviews of one restaurant, network first.
  ///
  /// Both paths filter by `restaurant_id`, so a server that ignores the query
  /// filter or a mirror holding other restaurants' reviews never leaks
  /// foreign entries.
  pub async fn fetch_reviews(&self, restaurant_id: RestaurantId) -> Result<Fetched<Vec<Review>>> {
    self
      .read_through(
        Collection::Reviews,
        || self.gateway.fetch_reviews(restaurant_id),
        |r: &Review| r.restaurant_id == restaurant_id,
      )
      .await
  }

  /// Network-first read of a whole collection, narrowed to `keep`.
  ///
  /// 1. Fetch from the network
  /// 2. On success, replace the mirror and return what the mirror now holds
  /// 3. On failure, return the mirror as is (offline mode)
  /// 4. If the mirror has nothing matching, the fresh data if there was
  ///    any, otherwise `DataUnavailable`
  async fn read_through<T, F, Fut, K>(
    &self,
    collection: Collection,
    fetcher: F,
    keep: K,
  ) -> Result<Fetched<Vec<T>>>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
    K: Fn(&T) -> bool,
  {
    let only = |records: Vec<T>| records.into_iter().filter(|r| keep(r)).collect::<Vec<_>>();

    let fresh = match fetcher().await {
      Ok(fresh) => match self.mirror(collection, &fresh) {
        Ok(mirrored) => return Ok(Fetched::from_network(only(mirrored))),
        Err(e) => {
          warn!(%collection, error = %e, "Failed to mirror fresh data");
          Some(only(fresh))
        }
      },
      Err(e) => {
        info!(%collection, error = %e, "Network fetch failed, serving cache");
        None
      }
    };

    let cached = match self.store.get_all::<T>(collection) {
      Ok(cached) => only(cached),
      Err(e) => {
        warn!(%collection, error = %e, "Failed to read cache");
        Vec::new()
      }
    };

    if !cached.is_empty() {
      return Ok(Fetched::from_cache(cached));
    }
    // Nothing usable in the mirror; the network may still have answered
    fresh
      .map(Fetched::from_network)
      .ok_or(Error::DataUnavailable)
  }

  /// Replace the collection with `records` and read it back.
  fn mirror<T>(&self, collection: Collection, records: &[T]) -> Result<Vec<T>>
  where
    T: Serialize + DeserializeOwned,
  {
    self.store.replace_all(collection, records)?;
    let mirrored = self.store.get_all(collection)?;
    debug!(%collection, count = mirrored.len(), "Mirrored fresh data");
    Ok(mirrored)
  }

  // ===== Writes =====

  /// Submit a review.
  ///
  /// The review is echoed into the reviews mirror right away so offline reads
  /// show it, then sent. Only invalid input is an error; delivery failures
  /// end up in the pending queue.
  pub async fn add_review(&self, review: &Review) -> Result<WriteOutcome> {
    validate_review(review)?;

    if let Err(e) = self.store.put(Collection::Reviews, review) {
      debug!(review_id = review.id, error = %e, "Failed to echo review into mirror");
    }

    Ok(self.deliver_review(review).await)
  }

  /// Set the favorite flag of a restaurant.
  pub async fn update_favorite(&self, restaurant_id: RestaurantId, is_favorite: bool) -> WriteOutcome {
    if let Err(e) = self.echo_favorite(restaurant_id, is_favorite) {
      debug!(restaurant_id, error = %e, "Failed to echo favorite into mirror");
    }

    self
      .deliver_status_update(&PendingStatusUpdate {
        restaurant_id,
        is_favorite,
      })
      .await
  }

  fn echo_favorite(&self, restaurant_id: RestaurantId, is_favorite: bool) -> Result<()> {
    let key = restaurant_id.to_string();
    if let Some(mut restaurant) = self.store.get::<Restaurant>(Collection::Restaurants, &key)? {
      restaurant.is_favorite = is_favorite;
      self.store.put(Collection::Restaurants, &restaurant)?;
    }
    Ok(())
  }

  /// One attempt to post a review; queue it on failure, unqueue it on success.
  async fn deliver_review(&self, review: &Review) -> WriteOutcome {
    let key = review.id.to_string();
    match self.gateway.post_review(review).await {
      Ok(()) => {
        if let Err(e) = self.store.delete(Collection::PendingReviews, &key) {
          warn!(review_id = review.id, error = %e, "Delivered review could not be unqueued");
        }
        info!(review_id = review.id, "Review delivered");
        WriteOutcome::Delivered
      }
      Err(e) => {
        info!(review_id = review.id, error = %e, "Review not delivered, queueing");
        self.enqueue(Collection::PendingReviews, review)
      }
    }
  }

  async fn deliver_status_update(&self, update: &PendingStatusUpdate) -> WriteOutcome {
    if self.send_status_update(update).await {
      let key = update.restaurant_id.to_string();
      if let Err(e) = self.store.delete(Collection::PendingStatusUpdates, &key) {
        warn!(restaurant_id = update.restaurant_id, error = %e, "Delivered status update could not be unqueued");
      }
      WriteOutcome::Delivered
    } else {
      self.enqueue(Collection::PendingStatusUpdates, update)
    }
  }

  /// Replay a queued status update.
  ///
  /// A toggle made while this one was in flight replaced the queue entry and
  /// must survive: the entry is only removed if it still holds what was sent,
  /// and a failed send never overwrites it.
  async fn redeliver_status_update(&self, update: &PendingStatusUpdate) -> WriteOutcome {
    let sent = self.send_status_update(update).await;
    let key = update.restaurant_id.to_string();
    let queued = match self.store.get::<PendingStatusUpdate>(Collection::PendingStatusUpdates, &key) {
      Ok(queued) => queued,
      Err(e) => {
        warn!(restaurant_id = update.restaurant_id, error = %e, "Failed to read queued status update");
        None
      }
    };

    match (sent, queued) {
      (true, Some(queued)) if queued == *update => {
        if let Err(e) = self.store.delete(Collection::PendingStatusUpdates, &key) {
          warn!(restaurant_id = update.restaurant_id, error = %e, "Delivered status update could not be unqueued");
        }
        WriteOutcome::Delivered
      }
      (true, queued) => {
        if queued.is_some() {
          debug!(restaurant_id = update.restaurant_id, "Newer status update queued meanwhile, keeping it");
        }
        WriteOutcome::Delivered
      }
      (false, Some(_)) => WriteOutcome::Queued,
      (false, None) => self.enqueue(Collection::PendingStatusUpdates, update),
    }
  }

  async fn send_status_update(&self, update: &PendingStatusUpdate) -> bool {
    match self
      .gateway
      .put_favorite_status(update.restaurant_id, update.is_favorite)
      .await
    {
      Ok(()) => {
        info!(
          restaurant_id = update.restaurant_id,
          is_favorite = update.is_favorite,
          "Favorite status delivered"
        );
        true
      }
      Err(e) => {
        info!(restaurant_id = update.restaurant_id, error = %e, "Favorite status not delivered, queueing");
        false
      }
    }
  }

  fn enqueue<T: Serialize>(&self, collection: Collection, record: &T) -> WriteOutcome {
    match self.store.put(collection, record) {
      Ok(()) => WriteOutcome::Queued,
      Err(e) => {
        error!(%collection, error = %e, "Failed to queue write, it will be lost");
        WriteOutcome::Dropped
      }
    }
  }

  // ===== Pending queues =====

  pub fn pending_reviews(&self) -> Result<Vec<Review>> {
    self.store.get_all(Collection::PendingReviews)
  }

  pub fn pending_status_updates(&self) -> Result<Vec<PendingStatusUpdate>> {
    self.store.get_all(Collection::PendingStatusUpdates)
  }

  /// Hand a review to the background worker's sync event instead of sending
  /// it now. One entry per restaurant; a newer review replaces an older one.
  pub fn queue_for_background_sync(&self, review: &Review) -> Result<()> {
    validate_review(review)?;
    self.store.put(Collection::ReviewsToSend, review)
  }

  /// Replay every pending write through the live write path.
  ///
  /// Both queues drain concurrently; within a queue a failed entry is
  /// requeued and the rest still run. Never fails: an unreadable queue is
  /// logged and counts as empty.
  pub async fn drain(&self) -> DrainReport {
    let _guard = self.drain_lock.lock().await;

    let (reviews, status_updates) = tokio::join!(self.drain_reviews(), self.drain_status_updates());
    let report = DrainReport {
      reviews,
      status_updates,
    };

    if !report.is_empty() {
      info!(
        reviews_delivered = report.reviews.delivered,
        status_delivered = report.status_updates.delivered,
        remaining = report.remaining(),
        "Drained pending writes"
      );
    }
    report
  }

  async fn drain_reviews(&self) -> QueueReport {
    let mut report = QueueReport::default();
    let pending = match self.pending_reviews() {
      Ok(pending) => pending,
      Err(e) => {
        warn!(error = %e, "Failed to read pending reviews");
        return report;
      }
    };

    for review in pending {
      report.record(self.deliver_review(&review).await);
    }
    report
  }

  async fn drain_status_updates(&self) -> QueueReport {
    let mut report = QueueReport::default();
    let pending = match self.pending_status_updates() {
      Ok(pending) => pending,
      Err(e) => {
        warn!(error = %e, "Failed to read pending status updates");
        return report;
      }
    };

    for update in pending {
      report.record(self.redeliver_status_update(&update).await);
    }
    report
  }
}

impl<G: RemoteGateway, S: Storage> Clone for SyncEngine<G, S> {
  fn clone(&self) -> Self {
    Self {
      gateway: Arc::clone(&self.gateway),
      store: Arc::clone(&self.store),
      drain_lock: Arc::clone(&self.drain_lock),
    }
  }
}

/// Reject reviews the server would refuse anyway.
pub fn validate_review(review: &Review) -> Result<()> {
  if review.name.trim().is_empty() {
    return Err(Error::InvalidInput("Review needs a name".to_string()));
  }
  if !(1..=5).contains(&review.rating) {
    return Err(Error::InvalidInput(format!(
      "Rating must be between 1 and 5, got {}",
      review.rating
    )));
  }
  Ok(())
}
