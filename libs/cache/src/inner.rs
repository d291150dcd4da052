use std::hash::Hash;
use std::{fmt, time::Duration};
use tokio::sync::{mpsc, oneshot};

use crate::api::{CacheKey, Snapshot};
use crate::{internals::CacheInternal, internals::Message, Builder};

pub(crate) struct CacheInner<K: Clone, V> {
    tx: mpsc::Sender<Message<K, V>>,
}

impl<K, V> CacheInner<K, V>
where
    K: Eq + Hash + Send + Clone + Sync + 'static,
    V: Send + Sync + Clone + 'static,
{
    pub(super) fn new(statics: Builder) -> Self {
        let (tx, rx) = mpsc::channel(128);

        tokio::spawn(async move {
            let internal = CacheInternal::new(statics);
            internal.run(rx).await
        });

        Self { tx }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Message<K, V>) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(make(tx)).await.is_err() {
            return None;
        }

        rx.await.ok()
    }

    pub(crate) async fn get(&self, key: CacheKey<'_, K>) -> Option<(V, Duration)> {
        let key = key.into_owned();
        self.request(|tx| Message::Get(key, tx)).await.flatten()
    }

    pub(crate) async fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let _ = self.tx.send(Message::Set(key, value, ttl)).await;
    }

    pub(crate) async fn remove(&self, key: CacheKey<'_, K>) -> Option<V> {
        let key = key.into_owned();
        self.request(|tx| Message::Remove(key, tx)).await.flatten()
    }

    pub(crate) async fn entries(&self) -> Vec<Snapshot<K, V>> {
        self.request(Message::Entries).await.unwrap_or_default()
    }

    pub(crate) async fn len(&self) -> usize {
        self.request(Message::Len).await.unwrap_or_default()
    }

    pub(crate) async fn clear(&self) -> usize {
        self.request(Message::Clear).await.unwrap_or_default()
    }
}

impl<K: Clone, V> fmt::Debug for CacheInner<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CacheInner").finish()
    }
}
