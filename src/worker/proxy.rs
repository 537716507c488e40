//! Local HTTP proxy that routes every request through the service worker.

use std::sync::Arc;

use axum::{
  body::{Body, Bytes},
  extract::State,
  http::{HeaderName, HeaderValue, Method, StatusCode, Uri},
  response::{IntoResponse, Response},
  Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{CachedResponse, Fetcher, Request, ServiceWorker};
use crate::api::RemoteGateway;
use crate::error::Error;
use crate::store::Storage;

/// Headers that describe the original connection, not the payload.
const HOP_BY_HOP: &[&str] = &[
  "connection",
  "content-length",
  "keep-alive",
  "transfer-encoding",
  "upgrade",
];

pub fn router<F, G, S>(worker: Arc<ServiceWorker<F, G, S>>) -> Router
where
  F: Fetcher + 'static,
  G: RemoteGateway + 'static,
  S: Storage + 'static,
{
  Router::new()
    .fallback(intercept::<F, G, S>)
    .layer(TraceLayer::new_for_http())
    .with_state(worker)
}

/// Serve the proxy until the process is stopped.
pub async fn serve<F, G, S>(worker: Arc<ServiceWorker<F, G, S>>, listen: &str) -> std::io::Result<()>
where
  F: Fetcher + 'static,
  G: RemoteGateway + 'static,
  S: Storage + 'static,
{
  let listener = TcpListener::bind(listen).await?;
  info!(addr = %listener.local_addr()?, "Proxy listening");
  axum::serve(listener, router(worker)).await
}

async fn intercept<F, G, S>(
  State(worker): State<Arc<ServiceWorker<F, G, S>>>,
  method: Method,
  uri: Uri,
  body: Bytes,
) -> Response
where
  F: Fetcher + 'static,
  G: RemoteGateway + 'static,
  S: Storage + 'static,
{
  let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
  let url = match worker.resolve(path) {
    Ok(url) => url,
    Err(e) => return e.into_response(),
  };

  let request = Request {
    method: method.to_string(),
    url,
    body: body.to_vec(),
  };
  match worker.fetch(&request).await {
    Ok(response) => to_response(response),
    Err(e) => e.into_response(),
  }
}

fn to_response(cached: CachedResponse) -> Response {
  let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::BAD_GATEWAY);
  let mut response = Response::new(Body::from(cached.body));
  *response.status_mut() = status;

  let headers = response.headers_mut();
  for (name, value) in &cached.headers {
    if HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str()) {
      continue;
    }
    match (
      HeaderName::from_bytes(name.as_bytes()),
      HeaderValue::from_str(value),
    ) {
      (Ok(name), Ok(value)) => {
        headers.append(name, value);
      }
      _ => warn!(header = %name, "Dropping invalid cached header"),
    }
  }
  response
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = match &self {
      Error::Network(_) => StatusCode::BAD_GATEWAY,
      Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(status = status.as_u16(), error = %self, "Request failed");
    (status, self.to_string()).into_response()
  }
}
