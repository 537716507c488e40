//! Offline-first cache and sync client for a restaurant review API.
//!
//! - `store`: durable collections mirrored from the API plus the pending write queues
//! - `api`: the remote gateway
//! - `sync`: read-through reads, buffered writes, drains
//! - `worker`: request interception with a response cache
//! - `page` / `event`: the context and signals a front end drives the core with

pub mod api;
pub mod config;
pub mod error;
pub mod event;
pub mod page;
pub mod store;
pub mod sync;
pub mod worker;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
