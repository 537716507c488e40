//! Offline synchronization engine.
//!
//! - Read-through: network first, mirror into the store, fall back to the
//!   mirror when the network is down
//! - Write buffering: one network attempt, queue in the store on failure
//! - Drain: replay the queues when connectivity returns

mod engine;
mod pending;
mod queries;
mod result;

pub use engine::{validate_review, SyncEngine};
pub use pending::{DrainReport, PendingStatusUpdate, QueueReport, WriteOutcome};
pub use queries::Filter;
pub use result::{DataSource, Fetched};
