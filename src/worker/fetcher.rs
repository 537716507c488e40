//! Requests, stored responses and the network side of the interception layer.

use std::future::Future;
use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// An intercepted request. `url` is always absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: String,
  pub body: Vec<u8>,
}

impl Request {
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: "GET".to_string(),
      url: url.into(),
      body: Vec::new(),
    }
  }

  pub fn is_get(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }

  /// Stable key for the (method, URL) pair.
  pub fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.to_ascii_uppercase().as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A whole HTTP response, as kept in the response cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl CachedResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// Network access for the interception layer.
///
/// A response with any status is `Ok`; only transport failures are errors.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<CachedResponse>> + Send;
}

/// `reqwest`-backed fetcher.
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| Error::Network(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Self { client })
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<CachedResponse> {
    let method = Method::from_bytes(request.method.as_bytes())
      .map_err(|e| Error::InvalidInput(format!("Invalid method '{}': {}", request.method, e)))?;

    let mut builder = self.client.request(method, &request.url);
    if !request.body.is_empty() {
      builder = builder.body(request.body.clone());
    }
    let response = builder.send().await?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
      .collect();
    let body = response.bytes().await?.to_vec();

    Ok(CachedResponse {
      status,
      headers,
      body,
    })
  }
}
