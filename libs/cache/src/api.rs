use std::{borrow::Cow, hash::Hash, sync::Arc, time::Duration};

use crate::inner::CacheInner;

#[derive(Debug)]
pub struct Cache<K: Clone, V> {
    pub(crate) inner: Arc<CacheInner<K, V>>,
}

impl<K: Clone, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Send + Clone + Sync + 'static,
    V: Send + Sync + Clone + 'static,
{
    /// Creates a new `Cache` instance with the provided builder.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn new(statics: Builder) -> Self {
        let inner = Arc::new(CacheInner::new(statics));
        Self { inner }
    }

    /// Returns a builder for creating a new `Cache` instance.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Gets a live value from the cache based on the given key.
    pub async fn get<'a>(&self, key: impl Into<CacheKey<'a, K>>) -> Option<V>
    where
        K: 'a,
    {
        self.inner.get(key.into()).await.map(|(value, _)| value)
    }

    /// Gets a live value together with the time it has left before expiring.
    pub async fn get_with_ttl<'a>(&self, key: impl Into<CacheKey<'a, K>>) -> Option<(V, Duration)>
    where
        K: 'a,
    {
        self.inner.get(key.into()).await
    }

    /// Returns the time left before `key` expires, or `None` if it is absent or already expired.
    pub async fn ttl<'a>(&self, key: impl Into<CacheKey<'a, K>>) -> Option<Duration>
    where
        K: 'a,
    {
        self.inner.get(key.into()).await.map(|(_, ttl)| ttl)
    }

    /// Sets a value using the builder's default expiry.
    pub async fn set(&self, key: K, value: V) {
        self.inner.set(key, value, None).await
    }

    /// Sets a value that expires after `ttl`, replacing any previous value and expiry.
    pub async fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.inner.set(key, value, Some(ttl)).await
    }

    /// Discards any cached value for key.
    pub async fn invalidate<'a>(&self, key: impl Into<CacheKey<'a, K>>) -> Option<V>
    where
        K: 'a,
    {
        self.inner.remove(key.into()).await
    }

    /// Returns a snapshot of every live entry.
    pub async fn entries(&self) -> Vec<Snapshot<K, V>> {
        self.inner.entries().await
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.inner.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Discards all entries in the cache and returns how many live entries were removed.
    pub async fn invalidate_all(&self) -> usize {
        self.inner.clear().await
    }
}

/// A live entry copied out of the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<K, V> {
    pub key: K,
    pub value: V,
    /// Time left before the entry expires.
    pub remaining: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheKey<'a, K: Clone>(Cow<'a, K>);

impl<'a, K: Clone> CacheKey<'a, K> {
    pub fn into_owned(self) -> K {
        self.0.into_owned()
    }
}

impl<'a, K: Clone> From<K> for CacheKey<'a, K> {
    fn from(key: K) -> Self {
        Self(Cow::Owned(key))
    }
}

impl<'a, K: Clone> From<&'a K> for CacheKey<'a, K> {
    fn from(key: &'a K) -> Self {
        Self(Cow::Borrowed(key))
    }
}

impl<'a, K: Clone> std::ops::Deref for CacheKey<'a, K> {
    type Target = K;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A builder for creating `Cache` instances.
#[derive(Debug, Clone)]
pub struct Builder {
    pub(crate) max_capacity: usize,
    pub(crate) expiry: Duration,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            max_capacity: 1_024,
            expiry: Duration::from_secs(10),
        }
    }
}

impl Builder {
    /// Sets the max capacity of the cache being built.
    ///
    /// Once full, expired entries are purged first; if none expired, the entry
    /// closest to expiring is evicted.
    pub fn max_capacity(mut self, capacity: usize) -> Self {
        self.max_capacity = capacity.max(1);
        self
    }

    /// Sets the default expiration duration for cache entries.
    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Builds a new `Cache` instance using the builder settings.
    pub fn build<K, V>(self) -> Cache<K, V>
    where
        K: Eq + Hash + Send + Clone + Sync + 'static,
        V: Send + Sync + Clone + 'static,
    {
        Cache::new(self)
    }
}
