//! The seam between the sync engine and the remote API.

use std::future::Future;

use super::types::{Restaurant, RestaurantId, Review};
use crate::error::Result;

/// Outbound calls to the restaurant/review API.
///
/// Implementations make exactly one attempt per call; retrying is left to the
/// sync engine's drain.
pub trait RemoteGateway: Send + Sync {
  /// `GET /restaurants`
  fn fetch_restaurants(&self) -> impl Future<Output = Result<Vec<Restaurant>>> + Send;

  /// `GET /reviews/?restaurant_id={id}`
  fn fetch_reviews(
    &self,
    restaurant_id: RestaurantId,
  ) -> impl Future<Output = Result<Vec<Review>>> + Send;

  /// `POST /reviews/` with only the fields the server does not assign itself.
  fn post_review(&self, review: &Review) -> impl Future<Output = Result<()>> + Send;

  /// `PUT /restaurants/{id}/?is_favorite={bool}`
  fn put_favorite_status(
    &self,
    restaurant_id: RestaurantId,
    is_favorite: bool,
  ) -> impl Future<Output = Result<()>> + Send;
}
