//! In-process fakes shared by unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{de::DeserializeOwned, Serialize};

use crate::api::{RemoteGateway, Restaurant, RestaurantId, Review};
use crate::error::{Error, Result};
use crate::store::{Collection, SqliteStore, Storage};
use crate::worker::{CachedResponse, Fetcher, Request};

type Hook = Box<dyn Fn() + Send + Sync>;

/// Gateway backed by in-memory vectors with a switchable network.
pub struct FakeGateway {
  online: AtomicBool,
  /// Return every review regardless of the requested restaurant
  ignore_review_filter: AtomicBool,
  restaurants: Mutex<Vec<Restaurant>>,
  reviews: Mutex<Vec<Review>>,
  posted: Mutex<Vec<Review>>,
  favorites: Mutex<Vec<(RestaurantId, bool)>>,
  /// Runs while a favorite update is in flight
  before_favorite: Mutex<Option<Hook>>,
}

impl FakeGateway {
  pub fn online() -> Self {
    Self {
      online: AtomicBool::new(true),
      ignore_review_filter: AtomicBool::new(false),
      restaurants: Mutex::new(Vec::new()),
      reviews: Mutex::new(Vec::new()),
      posted: Mutex::new(Vec::new()),
      favorites: Mutex::new(Vec::new()),
      before_favorite: Mutex::new(None),
    }
  }

  pub fn offline() -> Self {
    let gateway = Self::online();
    gateway.set_online(false);
    gateway
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }

  pub fn ignore_review_filter(&self) {
    self.ignore_review_filter.store(true, Ordering::SeqCst);
  }

  pub fn set_restaurants(&self, restaurants: Vec<Restaurant>) {
    *self.restaurants.lock().unwrap() = restaurants;
  }

  pub fn set_reviews(&self, reviews: Vec<Review>) {
    *self.reviews.lock().unwrap() = reviews;
  }

  pub fn posted(&self) -> Vec<Review> {
    self.posted.lock().unwrap().clone()
  }

  pub fn favorites(&self) -> Vec<(RestaurantId, bool)> {
    self.favorites.lock().unwrap().clone()
  }

  pub fn before_favorite(&self, hook: impl Fn() + Send + Sync + 'static) {
    *self.before_favorite.lock().unwrap() = Some(Box::new(hook));
  }

  fn check_online(&self) -> Result<()> {
    if self.online.load(Ordering::SeqCst) {
      Ok(())
    } else {
      Err(Error::Network("connection refused".to_string()))
    }
  }
}

impl RemoteGateway for FakeGateway {
  async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>> {
    self.check_online()?;
    Ok(self.restaurants.lock().unwrap().clone())
  }

  async fn fetch_reviews(&self, restaurant_id: RestaurantId) -> Result<Vec<Review>> {
    self.check_online()?;
    let ignore_filter = self.ignore_review_filter.load(Ordering::SeqCst);
    Ok(
      self
        .reviews
        .lock()
        .unwrap()
        .iter()
        .filter(|r| ignore_filter || r.restaurant_id == restaurant_id)
        .cloned()
        .collect(),
    )
  }

  async fn post_review(&self, review: &Review) -> Result<()> {
    self.check_online()?;
    self.posted.lock().unwrap().push(review.clone());
    Ok(())
  }

  async fn put_favorite_status(&self, restaurant_id: RestaurantId, is_favorite: bool) -> Result<()> {
    self.check_online()?;
    if let Some(hook) = self.before_favorite.lock().unwrap().as_ref() {
      hook();
    }
    self
      .favorites
      .lock()
      .unwrap()
      .push((restaurant_id, is_favorite));
    Ok(())
  }
}

/// Fetcher answering from a fixed URL table; unknown URLs get a 404.
pub struct FakeFetcher {
  online: AtomicBool,
  calls: AtomicUsize,
  routes: Mutex<HashMap<String, (u16, Vec<u8>)>>,
}

impl FakeFetcher {
  pub fn new() -> Self {
    Self {
      online: AtomicBool::new(true),
      calls: AtomicUsize::new(0),
      routes: Mutex::new(HashMap::new()),
    }
  }

  pub fn serve(&self, url: &str, status: u16, body: &[u8]) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), (status, body.to_vec()));
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }

  /// Requests that reached the network.
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Fetcher for FakeFetcher {
  async fn fetch(&self, request: &Request) -> Result<CachedResponse> {
    if !self.online.load(Ordering::SeqCst) {
      return Err(Error::Network("connection refused".to_string()));
    }
    self.calls.fetch_add(1, Ordering::SeqCst);

    let (status, body) = self
      .routes
      .lock()
      .unwrap()
      .get(&request.url)
      .cloned()
      .unwrap_or((404, b"Not Found".to_vec()));
    Ok(CachedResponse {
      status,
      headers: vec![("content-type".to_string(), "text/plain".to_string())],
      body,
    })
  }
}

/// SQLite store that can be read and written but refuses to be refreshed.
pub struct FailingRefreshStore(pub SqliteStore);

impl FailingRefreshStore {
  pub fn new() -> Self {
    Self(SqliteStore::open_in_memory().unwrap())
  }
}

impl Storage for FailingRefreshStore {
  fn put<T: Serialize>(&self, collection: Collection, record: &T) -> Result<()> {
    self.0.put(collection, record)
  }

  fn put_all<T: Serialize>(&self, collection: Collection, records: &[T]) -> Result<()> {
    self.0.put_all(collection, records)
  }

  fn get_all<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>> {
    self.0.get_all(collection)
  }

  fn get<T: DeserializeOwned>(&self, collection: Collection, key: &str) -> Result<Option<T>> {
    self.0.get(collection, key)
  }

  fn delete(&self, collection: Collection, key: &str) -> Result<()> {
    self.0.delete(collection, key)
  }

  fn clear(&self, collection: Collection) -> Result<()> {
    self.0.clear(collection)
  }

  fn replace_all<T: Serialize>(&self, _collection: Collection, _records: &[T]) -> Result<()> {
    Err(Error::StorageUnavailable("disk full".to_string()))
  }
}

pub fn restaurant(id: RestaurantId, name: &str, cuisine: &str, neighborhood: &str) -> Restaurant {
  Restaurant {
    id,
    name: name.to_string(),
    cuisine_type: cuisine.to_string(),
    neighborhood: neighborhood.to_string(),
    address: String::new(),
    latlng: None,
    photograph: None,
    operating_hours: BTreeMap::new(),
    is_favorite: false,
  }
}

pub fn review(id: u64, restaurant_id: RestaurantId, rating: u8) -> Review {
  Review {
    id,
    restaurant_id,
    name: format!("reviewer {}", id),
    rating,
    comments: "ok".to_string(),
    created_at: Some(1_531_078_904_000),
    updated_at: None,
  }
}
