use ahash::RandomState;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::api::Snapshot;
use crate::Builder;

type SendValueTx<V> = oneshot::Sender<Option<(V, Duration)>>;
type RemovedTx<V> = oneshot::Sender<Option<V>>;
type EntriesTx<K, V> = oneshot::Sender<Vec<Snapshot<K, V>>>;
type CountTx = oneshot::Sender<usize>;
type CacheRx<K, V> = mpsc::Receiver<Message<K, V>>;

pub(crate) enum Message<K, V> {
    Get(K, SendValueTx<V>),
    Set(K, V, Option<Duration>),
    Remove(K, RemovedTx<V>),
    Entries(EntriesTx<K, V>),
    Len(CountTx),
    Clear(CountTx),
}

pub(crate) struct CacheInternal<K, V> {
    map: HashMap<K, CacheEntry<V>, RandomState>,
    statics: Builder,
}

impl<K, V> CacheInternal<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + Clone + 'static,
{
    pub(crate) fn new(statics: Builder) -> Self {
        Self {
            map: HashMap::with_hasher(RandomState::default()),
            statics,
        }
    }

    pub(crate) async fn run(mut self, mut rx: CacheRx<K, V>) {
        while let Some(msg) = rx.recv().await {
            let now = Instant::now();

            match msg {
                Message::Get(key, tx) => {
                    let value = match self.map.get(&key) {
                        Some(entry) => match entry.remaining(now) {
                            Some(ttl) => Some((entry.value.clone(), ttl)),
                            None => {
                                self.map.remove(&key);
                                None
                            }
                        },
                        None => None,
                    };

                    let _ = tx.send(value);
                }

                Message::Set(key, value, ttl) => {
                    let ttl = ttl.unwrap_or(self.statics.expiry);
                    self.insert(key, value, now + ttl, now);
                }

                Message::Remove(key, tx) => {
                    let value = self
                        .map
                        .remove(&key)
                        .filter(|entry| !entry.is_expired(now))
                        .map(|entry| entry.value);

                    let _ = tx.send(value);
                }

                Message::Entries(tx) => {
                    self.purge_expired(now);
                    let entries = self
                        .map
                        .iter()
                        .filter_map(|(key, entry)| {
                            entry.remaining(now).map(|remaining| Snapshot {
                                key: key.clone(),
                                value: entry.value.clone(),
                                remaining,
                            })
                        })
                        .collect();

                    let _ = tx.send(entries);
                }

                Message::Len(tx) => {
                    self.purge_expired(now);
                    let _ = tx.send(self.map.len());
                }

                Message::Clear(tx) => {
                    self.purge_expired(now);
                    let count = self.map.len();
                    self.map.clear();
                    let _ = tx.send(count);
                }
            }
        }
    }

    fn insert(&mut self, key: K, value: V, expire_at: Instant, now: Instant) {
        if !self.map.contains_key(&key) && self.map.len() >= self.statics.max_capacity {
            self.purge_expired(now);

            if self.map.len() >= self.statics.max_capacity {
                self.evict_soonest();
            }
        }

        self.map.insert(key, CacheEntry { value, expire_at });
    }

    fn purge_expired(&mut self, now: Instant) {
        self.map.retain(|_, entry| !entry.is_expired(now));
    }

    fn evict_soonest(&mut self) {
        let soonest = self
            .map
            .iter()
            .min_by_key(|(_, entry)| entry.expire_at)
            .map(|(key, _)| key.clone());

        if let Some(key) = soonest {
            self.map.remove(&key);
        }
    }
}

struct CacheEntry<V> {
    value: V,
    expire_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expire_at
    }

    fn remaining(&self, now: Instant) -> Option<Duration> {
        match self.is_expired(now) {
            true => None,
            false => Some(self.expire_at - now),
        }
    }
}
