pub mod app;
pub mod config;
pub mod constants;
pub mod executor;
pub mod gateway;
pub mod liveness;
pub mod models;
pub mod servers;
pub mod signals;
pub mod stats;
pub mod storage;

#[cfg(feature = "redis-store")]
extern crate redis;
