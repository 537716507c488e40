//! Per-page state handed to the presentation layer.
//!
//! A `PageContext` owns everything the restaurant page used to keep in
//! globals: the restaurant being shown and the id counter for locally
//! created reviews. It lives as long as the page and is passed explicitly.

use chrono::Utc;
use tracing::{debug, warn};

use crate::api::{RemoteGateway, Restaurant, RestaurantId, Review, ReviewId};
use crate::error::Result;
use crate::store::Storage;
use crate::sync::{SyncEngine, WriteOutcome};

/// What the user typed into the review form.
#[derive(Debug, Clone)]
pub struct ReviewDraft {
  pub name: String,
  pub rating: u8,
  pub comments: String,
}

pub struct PageContext<G: RemoteGateway, S: Storage> {
  engine: SyncEngine<G, S>,
  restaurant_id: RestaurantId,
  restaurant: Option<Restaurant>,
  last_review_id: ReviewId,
}

impl<G: RemoteGateway, S: Storage> PageContext<G, S> {
  pub fn new(engine: SyncEngine<G, S>, restaurant_id: RestaurantId) -> Self {
    // Continue above anything still queued so local ids never collide
    let last_review_id = engine
      .pending_reviews()
      .unwrap_or_default()
      .iter()
      .map(|r| r.id)
      .max()
      .unwrap_or(0);

    Self {
      engine,
      restaurant_id,
      restaurant: None,
      last_review_id,
    }
  }

  pub fn restaurant_id(&self) -> RestaurantId {
    self.restaurant_id
  }

  pub fn engine(&self) -> &SyncEngine<G, S> {
    &self.engine
  }

  /// The page's restaurant, fetched once and then kept for the page lifetime.
  pub async fn restaurant(&mut self) -> Result<&Restaurant> {
    let restaurant = match self.restaurant.take() {
      Some(r) => r,
      None => self.engine.restaurant_by_id(self.restaurant_id).await?,
    };
    Ok(&*self.restaurant.insert(restaurant))
  }

  /// Reviews to render. Empty when nothing is available; the caller shows
  /// its "no reviews" placeholder.
  pub async fn reviews(&self) -> Vec<Review> {
    match self.engine.fetch_reviews(self.restaurant_id).await {
      Ok(fetched) => fetched.data,
      Err(e) => {
        debug!(restaurant_id = self.restaurant_id, error = %e, "No reviews to show");
        Vec::new()
      }
    }
  }

  /// Turn a draft into a review for this restaurant and submit it.
  ///
  /// Returns the review as it should be rendered right away, regardless of
  /// whether it reached the server.
  pub async fn submit_review(&mut self, draft: ReviewDraft) -> Result<(Review, WriteOutcome)> {
    let review = self.review_from(draft);
    let outcome = self.engine.add_review(&review).await?;
    if outcome == WriteOutcome::Dropped {
      warn!(review_id = review.id, "Review could not be sent or saved");
    }
    Ok((review, outcome))
  }

  /// Hand the review to the worker's background sync instead of sending it.
  pub fn submit_in_background(&mut self, draft: ReviewDraft) -> Result<Review> {
    let review = self.review_from(draft);
    self.engine.queue_for_background_sync(&review)?;
    Ok(review)
  }

  fn review_from(&mut self, draft: ReviewDraft) -> Review {
    let now = Utc::now().timestamp_millis();
    Review {
      id: self.next_review_id(now),
      restaurant_id: self.restaurant_id,
      name: draft.name,
      rating: draft.rating,
      comments: draft.comments,
      created_at: Some(now),
      updated_at: None,
    }
  }

  /// Toggle the favorite flag, keeping the page's copy in step.
  pub async fn set_favorite(&mut self, is_favorite: bool) -> WriteOutcome {
    if let Some(restaurant) = self.restaurant.as_mut() {
      restaurant.is_favorite = is_favorite;
    }
    self
      .engine
      .update_favorite(self.restaurant_id, is_favorite)
      .await
  }

  /// Handler for the host's "back online" signal.
  pub async fn on_online(&self) {
    self.engine.drain().await;
  }

  /// Local ids are millisecond timestamps, bumped when two land in the same
  /// millisecond, which keeps them clear of server-assigned ids.
  fn next_review_id(&mut self, now_millis: i64) -> ReviewId {
    let candidate = u64::try_from(now_millis).unwrap_or(0);
    self.last_review_id = candidate.max(self.last_review_id.saturating_add(1));
    self.last_review_id
  }
}
