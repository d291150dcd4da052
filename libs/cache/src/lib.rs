//! An actor-backed key/value map whose entries expire after a per-entry TTL.
//!
//! All mutation happens on a single task that owns the map; handles talk to it
//! over a channel, so a `Cache` can be cloned freely across tasks and threads.

mod api;
mod inner;
mod internals;

pub use api::{Builder, Cache, CacheKey, Snapshot};
