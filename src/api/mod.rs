//! Remote gateway for the restaurant review API.
//!
//! `RemoteGateway` is the trait the sync engine talks to; `ApiClient` is the
//! reqwest implementation used against a real server.

pub mod client;
pub mod gateway;
pub mod types;

pub use client::ApiClient;
pub use gateway::RemoteGateway;
pub use types::{LatLng, Restaurant, RestaurantId, Review, ReviewId};
