//! Request interception layer.
//!
//! Sits between the page and the network: serves whole responses from a
//! named response cache, falls back to the network and keeps a copy, and
//! sends reviews handed over for background sync.

mod cache;
mod fetcher;
pub mod proxy;

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};
use url::Url;

use crate::api::{RemoteGateway, Review};
use crate::error::{Error, Result};
use crate::store::{Collection, Storage};

pub use cache::ResponseCache;
pub use fetcher::{CachedResponse, Fetcher, HttpFetcher, Request};

/// Paths precached on install.
pub const DEFAULT_MANIFEST: &[&str] = &[
  "/css/styles.css",
  "/data/",
  "/data/restaurants.json",
  "/img/1.jpg",
  "/img/2.jpg",
  "/img/3.jpg",
  "/img/4.jpg",
  "/img/5.jpg",
  "/img/6.jpg",
  "/img/7.jpg",
  "/img/8.jpg",
  "/img/9.jpg",
  "/img/10.jpg",
  "/js/",
  "/js/dbhelper.js",
  "/js/main.js",
  "/js/restaurant_info.js",
  "/index.html",
  "/restaurant.html",
  "/",
];

/// Outcome of populating the response cache.
#[derive(Debug, Default)]
pub struct InstallReport {
  /// URLs now in the cache
  pub cached: Vec<String>,
  /// One `CachePopulation` error per asset that could not be cached
  pub failures: Vec<Error>,
  /// Responses dropped from older caches
  pub purged: usize,
}

impl InstallReport {
  pub fn is_complete(&self) -> bool {
    self.failures.is_empty()
  }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
  pub sent: usize,
  pub failed: usize,
}

pub struct ServiceWorker<F: Fetcher, G: RemoteGateway, S: Storage> {
  fetcher: F,
  cache: ResponseCache,
  origin: Url,
  gateway: Arc<G>,
  store: Arc<S>,
}

impl<F: Fetcher, G: RemoteGateway, S: Storage> ServiceWorker<F, G, S> {
  pub fn new(
    fetcher: F,
    cache: ResponseCache,
    origin: &str,
    gateway: Arc<G>,
    store: Arc<S>,
  ) -> Result<Self> {
    let origin = Url::parse(origin)
      .map_err(|e| Error::InvalidInput(format!("Invalid origin '{}': {}", origin, e)))?;

    Ok(Self {
      fetcher,
      cache,
      origin,
      gateway,
      store,
    })
  }

  pub fn cache(&self) -> &ResponseCache {
    &self.cache
  }

  /// Absolute URL for a path (and query) on the origin.
  ///
  /// Anything that resolves to another origin (`//host/x`, `http://...`) is
  /// rejected.
  pub fn resolve(&self, path: &str) -> Result<String> {
    let url = self
      .origin
      .join(path)
      .map_err(|e| Error::InvalidInput(format!("Invalid path '{}': {}", path, e)))?;
    if url.origin() != self.origin.origin() {
      return Err(Error::InvalidInput(format!(
        "Path '{}' leaves the origin",
        path
      )));
    }
    Ok(url.into())
  }

  /// Fetch every manifest path concurrently into the cache.
  ///
  /// Never fails as a whole: each asset that cannot be cached shows up in
  /// `failures` and the rest are still stored. Older caches are dropped
  /// only once every asset made it, so a failed install leaves the previous
  /// version serving.
  pub async fn install(&self, manifest: &[String]) -> InstallReport {
    let results = join_all(manifest.iter().map(|path| self.precache(path))).await;

    let mut report = InstallReport::default();
    for result in results {
      match result {
        Ok(url) => report.cached.push(url),
        Err(e) => {
          warn!(error = %e, "Asset not precached");
          report.failures.push(e);
        }
      }
    }

    if report.is_complete() {
      match self.cache.purge_other_caches() {
        Ok(purged) => report.purged = purged,
        Err(e) => warn!(error = %e, "Failed to drop old caches"),
      }
    } else {
      info!(cache = self.cache.name(), "Install incomplete, keeping old caches");
    }

    info!(
      cache = self.cache.name(),
      cached = report.cached.len(),
      failed = report.failures.len(),
      "Install finished"
    );
    report
  }

  async fn precache(&self, path: &str) -> Result<String> {
    let url = self.resolve(path).map_err(|e| Error::CachePopulation {
      url: path.to_string(),
      reason: e.to_string(),
    })?;
    let failed = |reason: String| Error::CachePopulation {
      url: url.clone(),
      reason,
    };

    let request = Request::get(url.clone());
    let response = self
      .fetcher
      .fetch(&request)
      .await
      .map_err(|e| failed(e.to_string()))?;
    if !response.is_success() {
      return Err(failed(format!("status {}", response.status)));
    }
    self
      .cache
      .store(&request, &response)
      .map_err(|e| failed(e.to_string()))?;

    debug!(url = %url, "Precached");
    Ok(url)
  }

  /// Answer a request: cached copy if there is one, network otherwise.
  ///
  /// Successful GET responses from the network are stored on the way out.
  /// A failed store is logged and the response is still returned.
  pub async fn fetch(&self, request: &Request) -> Result<CachedResponse> {
    if request.is_get() {
      match self.cache.lookup(request) {
        Ok(Some(hit)) => {
          debug!(url = %request.url, "Cache hit");
          return Ok(hit);
        }
        Ok(None) => debug!(url = %request.url, "Cache miss"),
        Err(e) => warn!(url = %request.url, error = %e, "Cache lookup failed"),
      }
    }

    let response = self.fetcher.fetch(request).await?;

    if request.is_get() && response.is_success() {
      if let Err(e) = self.cache.store(request, &response) {
        let e = Error::CachePopulation {
          url: request.url.clone(),
          reason: e.to_string(),
        };
        warn!(error = %e, "Response not cached");
      }
    }
    Ok(response)
  }

  /// Send everything queued for background sync, once.
  ///
  /// The queue is emptied before sending; a failed post is logged and the
  /// review is not retried.
  pub async fn sync(&self) -> SyncReport {
    let mut report = SyncReport::default();

    let queued: Vec<Review> = match self.store.get_all(Collection::ReviewsToSend) {
      Ok(queued) => queued,
      Err(e) => {
        warn!(error = %e, "Failed to read reviews to send");
        return report;
      }
    };
    if queued.is_empty() {
      return report;
    }

    // Leave the queue alone if it can't be emptied, so nothing is sent twice
    if let Err(e) = self.store.clear(Collection::ReviewsToSend) {
      warn!(error = %e, "Failed to clear reviews to send");
      return report;
    }

    for review in &queued {
      match self.gateway.post_review(review).await {
        Ok(()) => report.sent += 1,
        Err(e) => {
          warn!(restaurant_id = review.restaurant_id, error = %e, "Background review not sent");
          report.failed += 1;
        }
      }
    }

    info!(sent = report.sent, failed = report.failed, "Background sync finished");
    report
  }
}
