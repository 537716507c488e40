//! End-to-end tests of the sync engine against a mock API over HTTP.

use std::sync::{Arc, Mutex};

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, put},
  Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use reviewcache::api::ApiClient;
use reviewcache::config::ApiConfig;
use reviewcache::page::{PageContext, ReviewDraft};
use reviewcache::store::SqliteStore;
use reviewcache::sync::{DataSource, SyncEngine, WriteOutcome};
use reviewcache::Error;

#[derive(Default)]
struct MockApi {
  down: bool,
  ignore_review_filter: bool,
  restaurants: Vec<Value>,
  reviews: Vec<Value>,
  posted: Vec<Value>,
  favorites: Vec<(u64, String)>,
}

type Shared = Arc<Mutex<MockApi>>;

#[derive(Deserialize)]
struct ReviewQuery {
  restaurant_id: Option<u64>,
}

#[derive(Deserialize)]
struct FavoriteQuery {
  is_favorite: String,
}

fn unavailable() -> Response {
  (StatusCode::SERVICE_UNAVAILABLE, "down").into_response()
}

async fn restaurants(State(api): State<Shared>) -> Response {
  let api = api.lock().unwrap();
  if api.down {
    return unavailable();
  }
  Json(api.restaurants.clone()).into_response()
}

async fn reviews(State(api): State<Shared>, Query(query): Query<ReviewQuery>) -> Response {
  let api = api.lock().unwrap();
  if api.down {
    return unavailable();
  }
  let reviews: Vec<Value> = api
    .reviews
    .iter()
    .filter(|r| match query.restaurant_id {
      Some(id) if !api.ignore_review_filter => same_id(&r["restaurant_id"], id),
      _ => true,
    })
    .cloned()
    .collect();
  Json(reviews).into_response()
}

/// Ids are stored as numbers or strings, like the reference server does.
fn same_id(value: &Value, id: u64) -> bool {
  match value {
    Value::Number(n) => n.as_u64() == Some(id),
    Value::String(s) => s.parse::<u64>().ok() == Some(id),
    _ => false,
  }
}

async fn post_review(State(api): State<Shared>, Json(body): Json<Value>) -> Response {
  let mut api = api.lock().unwrap();
  if api.down {
    return unavailable();
  }
  api.posted.push(body.clone());
  (StatusCode::CREATED, Json(body)).into_response()
}

async fn put_favorite(
  State(api): State<Shared>,
  Path(id): Path<u64>,
  Query(query): Query<FavoriteQuery>,
) -> Response {
  let mut api = api.lock().unwrap();
  if api.down {
    return unavailable();
  }
  api.favorites.push((id, query.is_favorite));
  Json(json!({ "id": id })).into_response()
}

async fn spawn_api(api: Shared) -> ApiClient {
  let app = Router::new()
    .route("/restaurants", get(restaurants))
    .route("/reviews/", get(reviews).post(post_review))
    .route("/restaurants/{id}/", put(put_favorite))
    .with_state(api);

  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

  ApiClient::new(&ApiConfig {
    url: format!("http://{}", addr),
    timeout_secs: 5,
  })
  .unwrap()
}

fn restaurant(id: u64, name: &str) -> Value {
  json!({
    "id": id,
    "name": name,
    "neighborhood": "Manhattan",
    "cuisine_type": "Asian",
    "address": "171 E Broadway",
    "latlng": { "lat": 40.713829, "lng": -73.989667 },
    "photograph": id.to_string(),
    "operating_hours": { "Monday": "5:30 pm - 11:00 pm" },
    "is_favorite": "false"
  })
}

fn review(id: u64, restaurant_id: u64) -> Value {
  json!({
    "id": id,
    "restaurant_id": restaurant_id.to_string(),
    "name": "Steve",
    "rating": "4",
    "comments": "Mission Chinese Food has grown up",
    "createdAt": 1504095563444u64,
    "updatedAt": "2018-07-08T19:21:44.000Z"
  })
}

#[tokio::test]
async fn test_refresh_replaces_mirror_and_survives_restart() {
  let api = Shared::default();
  api.lock().unwrap().restaurants = vec![restaurant(1, "A"), restaurant(2, "B")];
  let client = spawn_api(Arc::clone(&api)).await;

  let dir = tempfile::tempdir().unwrap();
  {
    let engine = SyncEngine::new(client.clone(), SqliteStore::open_named(dir.path(), "restaurantsDB").unwrap());
    let fetched = engine.fetch_restaurants().await.unwrap();
    assert_eq!(fetched.source, DataSource::Network);
    assert_eq!(fetched.data.len(), 2);

    api.lock().unwrap().restaurants = vec![restaurant(1, "A")];
    let fetched = engine.fetch_restaurants().await.unwrap();
    assert_eq!(fetched.data.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
  }

  // A new process, offline
  api.lock().unwrap().down = true;
  let engine = SyncEngine::new(client, SqliteStore::open_named(dir.path(), "restaurantsDB").unwrap());
  let fetched = engine.fetch_restaurants().await.unwrap();
  assert_eq!(fetched.source, DataSource::Cache);
  assert_eq!(fetched.data.len(), 1);
  assert_eq!(fetched.data[0].name, "A");
  assert!(!fetched.data[0].is_favorite);
  assert_eq!(fetched.data[0].image_path(), "/img/1.jpg");
}

#[tokio::test]
async fn test_offline_review_is_sent_once_after_reconnect() {
  let api = Shared::default();
  api.lock().unwrap().down = true;
  let client = spawn_api(Arc::clone(&api)).await;

  let dir = tempfile::tempdir().unwrap();
  let engine = SyncEngine::new(client, SqliteStore::open_named(dir.path(), "restaurantsDB").unwrap());
  let mut page = PageContext::new(engine.clone(), 5);

  let (submitted, outcome) = page
    .submit_review(ReviewDraft {
      name: "Ana".to_string(),
      rating: 5,
      comments: "Great dumplings".to_string(),
    })
    .await
    .unwrap();
  assert_eq!(outcome, WriteOutcome::Queued);
  assert_eq!(engine.pending_reviews().unwrap(), vec![submitted]);

  api.lock().unwrap().down = false;
  let report = engine.drain().await;
  assert_eq!(report.reviews.delivered, 1);
  assert!(engine.pending_reviews().unwrap().is_empty());

  assert!(engine.drain().await.is_empty());

  let posted = api.lock().unwrap().posted.clone();
  assert_eq!(
    posted,
    vec![json!({
      "restaurant_id": 5,
      "name": "Ana",
      "rating": 5,
      "comments": "Great dumplings"
    })]
  );
}

#[tokio::test]
async fn test_reviews_filtered_even_when_server_is_not() {
  let api = Shared::default();
  {
    let mut api = api.lock().unwrap();
    api.ignore_review_filter = true;
    api.reviews = vec![review(1, 7), review(2, 3), review(3, 7)];
  }
  let client = spawn_api(Arc::clone(&api)).await;
  let engine = SyncEngine::new(client, SqliteStore::open_in_memory().unwrap());

  let fetched = engine.fetch_reviews(7).await.unwrap();
  assert_eq!(fetched.data.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);
  assert_eq!(fetched.data[0].rating, 4);
  assert_eq!(fetched.data[0].updated_at, Some(1_531_077_704_000));

  api.lock().unwrap().down = true;
  let cached = engine.fetch_reviews(3).await.unwrap();
  assert_eq!(cached.source, DataSource::Cache);
  assert_eq!(cached.data.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2]);
}

#[tokio::test]
async fn test_favorite_toggle_reaches_server_after_outage() {
  let api = Shared::default();
  api.lock().unwrap().down = true;
  let client = spawn_api(Arc::clone(&api)).await;
  let engine = SyncEngine::new(client, SqliteStore::open_in_memory().unwrap());

  assert_eq!(engine.update_favorite(3, true).await, WriteOutcome::Queued);
  assert_eq!(engine.update_favorite(3, false).await, WriteOutcome::Queued);

  api.lock().unwrap().down = false;
  assert_eq!(engine.drain().await.status_updates.delivered, 1);
  assert_eq!(
    api.lock().unwrap().favorites,
    vec![(3, "false".to_string())]
  );
}

#[tokio::test]
async fn test_unreachable_api_with_empty_store() {
  let client = ApiClient::new(&ApiConfig {
    url: "http://127.0.0.1:9".to_string(),
    timeout_secs: 1,
  })
  .unwrap();
  let engine = SyncEngine::new(client, SqliteStore::open_in_memory().unwrap());

  assert!(!engine.gateway().probe().await);
  assert!(matches!(
    engine.fetch_restaurants().await,
    Err(Error::DataUnavailable)
  ));
  assert!(engine.drain().await.is_empty());
}
