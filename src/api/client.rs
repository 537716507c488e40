//! HTTP client for the restaurant review API.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;
use url::Url;

use super::gateway::RemoteGateway;
use super::types::{Restaurant, RestaurantId, Review};
use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// Body of `POST /reviews/`. The server assigns id and timestamps.
#[derive(Debug, Serialize)]
struct ReviewPayload<'a> {
  restaurant_id: RestaurantId,
  name: &'a str,
  rating: u8,
  comments: &'a str,
}

impl<'a> From<&'a Review> for ReviewPayload<'a> {
  fn from(review: &'a Review) -> Self {
    Self {
      restaurant_id: review.restaurant_id,
      name: &review.name,
      rating: review.rating,
      comments: &review.comments,
    }
  }
}

/// API client. Clone is cheap, reqwest::Client shares its connection pool.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  base: Url,
}

impl ApiClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;

    Ok(Self {
      client,
      base: base_url(&config.url)?,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path)
      .map_err(|e| Error::InvalidInput(format!("Bad endpoint {}: {}", path, e)))
  }

  /// Check if response is successful, returning an error with body if not.
  async fn check_response(response: Response) -> Result<Response> {
    if response.status().is_success() {
      Ok(response)
    } else {
      let status = response.status();
      let url = response.url().to_string();
      let body = response.text().await.unwrap_or_default();
      Err(Error::from_status(status, &url, &body))
    }
  }

  async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
    debug!(%url, "GET");
    let response = self.client.get(url.clone()).send().await?;
    let response = Self::check_response(response).await?;
    response
      .json()
      .await
      .map_err(|e| Error::Network(format!("Failed to parse response from {}: {}", url, e)))
  }

  /// Whether the API host answers at all. Any HTTP status counts as reachable.
  pub async fn probe(&self) -> bool {
    self.client.get(self.base.clone()).send().await.is_ok()
  }
}

/// Parse the configured base URL, making sure relative joins land below it.
fn base_url(raw: &str) -> Result<Url> {
  let mut url =
    Url::parse(raw).map_err(|e| Error::InvalidInput(format!("Invalid API url '{}': {}", raw, e)))?;
  if !url.path().ends_with('/') {
    let path = format!("{}/", url.path());
    url.set_path(&path);
  }
  Ok(url)
}

impl RemoteGateway for ApiClient {
  async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>> {
    let url = self.endpoint("restaurants")?;
    self.get(url).await
  }

  async fn fetch_reviews(&self, restaurant_id: RestaurantId) -> Result<Vec<Review>> {
    let mut url = self.endpoint("reviews/")?;
    url
      .query_pairs_mut()
      .append_pair("restaurant_id", &restaurant_id.to_string());
    self.get(url).await
  }

  async fn post_review(&self, review: &Review) -> Result<()> {
    let url = self.endpoint("reviews/")?;
    debug!(%url, review_id = review.id, "POST");
    let response = self
      .client
      .post(url)
      .json(&ReviewPayload::from(review))
      .send()
      .await?;
    Self::check_response(response).await?;
    Ok(())
  }

  async fn put_favorite_status(&self, restaurant_id: RestaurantId, is_favorite: bool) -> Result<()> {
    let mut url = self.endpoint(&format!("restaurants/{}/", restaurant_id))?;
    url
      .query_pairs_mut()
      .append_pair("is_favorite", if is_favorite { "true" } else { "false" });
    debug!(%url, "PUT");
    let response = self.client.put(url).send().await?;
    Self::check_response(response).await?;
    Ok(())
  }
}
