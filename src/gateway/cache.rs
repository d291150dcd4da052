use log::warn;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{CacheEntry, Fingerprint, TaskResult};
use crate::storage::{self, CacheStore, Storage};

/// Fingerprinted cache of successful results, consulted before dispatch.
///
/// The cache is an optimization: read failures count as misses and write
/// failures are only logged.
#[derive(Clone)]
pub struct ResultCache {
    storage: Arc<dyn Storage>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(storage: Arc<dyn Storage>, ttl: Duration) -> Self {
        Self { storage, ttl }
    }

    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        match self.storage.cache_get(fingerprint).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!("cache read for {} failed: {}", fingerprint, err);
                None
            }
        }
    }

    pub async fn set(&self, fingerprint: Fingerprint, result: TaskResult) {
        self.set_with_ttl(fingerprint, result, self.ttl).await
    }

    pub async fn set_with_ttl(&self, fingerprint: Fingerprint, result: TaskResult, ttl: Duration) {
        let entry = CacheEntry::new(fingerprint, result, ttl);
        if let Err(err) = self.storage.cache_set(entry).await {
            warn!("cache write failed: {}", err);
        }
    }

    /// Removes every entry and returns how many there were.
    pub async fn clear(&self) -> storage::Result<usize> {
        self.storage.cache_clear().await
    }

    pub async fn len(&self) -> storage::Result<usize> {
        self.storage.cache_len().await
    }
}
