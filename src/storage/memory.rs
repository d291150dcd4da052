use async_trait::async_trait;
use hv_cache::Cache;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::time::{self, Instant};

use super::{
    CacheStore, Error, LeaseInfo, LeaseStore, Result, ResultStore, Storage, WorkQueue,
};
use crate::config::{MemoryStorageConfig, StorageType};
use crate::models::{
    CacheEntry, Envelope, ExecutorId, ExecutorRecord, Fingerprint, TaskId, TaskResult,
};

/// Single-process backend: every executor and the gateway share one instance.
#[derive(Debug)]
pub struct MemoryStorage {
    sender: mpsc::Sender<Envelope>,
    receiver: AsyncMutex<mpsc::Receiver<Envelope>>,
    mailbox: Mailbox,
    leases: Cache<ExecutorId, ExecutorRecord>,
    cache: Cache<Fingerprint, CacheEntry>,
}

impl MemoryStorage {
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &MemoryStorageConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));

        Self {
            sender,
            receiver: AsyncMutex::new(receiver),
            mailbox: Mailbox::default(),
            leases: Cache::<ExecutorId, ExecutorRecord>::builder().build(),
            cache: Cache::<Fingerprint, CacheEntry>::builder()
                .max_capacity(config.cache_capacity)
                .build(),
        }
    }

    /// Number of published results nobody has taken yet. Expired ones are dropped first.
    pub fn parked_results(&self) -> usize {
        let mut slots = self.mailbox.lock();
        purge_expired(&mut slots, Instant::now());
        slots.len()
    }
}

#[async_trait]
impl WorkQueue for MemoryStorage {
    async fn enqueue(&self, envelope: Envelope) -> Result<()> {
        match envelope {
            // Poison must get through even when the queue is full.
            Envelope::Shutdown => self
                .sender
                .send(envelope)
                .await
                .map_err(|_| Error::unavailable("work queue is closed")),
            Envelope::Task(_) => self.sender.try_send(envelope).map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => Error::unavailable("work queue is full"),
                mpsc::error::TrySendError::Closed(_) => Error::unavailable("work queue is closed"),
            }),
        }
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<Envelope>> {
        let claim = async {
            let mut receiver = self.receiver.lock().await;
            receiver.recv().await
        };

        Ok(time::timeout(timeout, claim).await.ok().flatten())
    }

    async fn depth(&self) -> Result<usize> {
        Ok(self.sender.max_capacity() - self.sender.capacity())
    }
}

#[async_trait]
impl ResultStore for MemoryStorage {
    async fn put(&self, result: TaskResult, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        {
            let mut slots = self.mailbox.lock();
            purge_expired(&mut slots, now);
            slots.push_back(Parked {
                result,
                expire_at: super::deadline_after(now, ttl),
            });
        }

        self.mailbox.arrived.notify_waiters();
        Ok(())
    }

    async fn take(&self, task_id: &TaskId, timeout: Duration) -> Result<Option<TaskResult>> {
        let deadline = super::deadline_after(Instant::now(), timeout);

        loop {
            // Register interest before scanning so a put between the scan and
            // the wait still wakes us.
            let arrived = self.mailbox.arrived.notified();
            tokio::pin!(arrived);
            arrived.as_mut().enable();

            if let Some(result) = self.mailbox.claim(task_id) {
                return Ok(Some(result));
            }

            if time::timeout_at(deadline, arrived).await.is_err() {
                return Ok(None);
            }
        }
    }
}

#[async_trait]
impl LeaseStore for MemoryStorage {
    async fn renew(&self, record: &ExecutorRecord, ttl: Duration) -> Result<()> {
        self.leases
            .set_with_ttl(record.id.clone(), record.clone(), ttl)
            .await;
        Ok(())
    }

    async fn remaining(&self, id: &ExecutorId) -> Result<Option<Duration>> {
        Ok(self.leases.ttl(id).await)
    }

    async fn leases(&self) -> Result<Vec<LeaseInfo>> {
        let leases = self
            .leases
            .entries()
            .await
            .into_iter()
            .map(|snapshot| LeaseInfo {
                record: snapshot.value,
                remaining: snapshot.remaining,
            })
            .collect();

        Ok(leases)
    }
}

#[async_trait]
impl CacheStore for MemoryStorage {
    async fn cache_get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        Ok(self.cache.get(fingerprint).await)
    }

    async fn cache_set(&self, entry: CacheEntry) -> Result<()> {
        let ttl = entry.ttl;
        self.cache
            .set_with_ttl(entry.fingerprint.clone(), entry, ttl)
            .await;
        Ok(())
    }

    async fn cache_clear(&self) -> Result<usize> {
        Ok(self.cache.invalidate_all().await)
    }

    async fn cache_len(&self) -> Result<usize> {
        Ok(self.cache.len().await)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn kind(&self) -> StorageType {
        StorageType::Memory
    }

    async fn ping(&self) -> Result<()> {
        match self.sender.is_closed() {
            true => Err(Error::unavailable("work queue is closed")),
            false => Ok(()),
        }
    }
}

#[derive(Debug)]
struct Parked {
    result: TaskResult,
    expire_at: Instant,
}

/// Results waiting for their callers, in arrival order.
#[derive(Debug, Default)]
struct Mailbox {
    slots: Mutex<VecDeque<Parked>>,
    arrived: Notify,
}

impl Mailbox {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Parked>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Removes the result for `task_id`, leaving every other result in place.
    fn claim(&self, task_id: &TaskId) -> Option<TaskResult> {
        let mut slots = self.lock();
        purge_expired(&mut slots, Instant::now());

        let pos = slots.iter().position(|p| p.result.task_id == *task_id)?;
        slots.remove(pos).map(|parked| parked.result)
    }
}

fn purge_expired(slots: &mut VecDeque<Parked>, now: Instant) {
    slots.retain(|parked| parked.expire_at > now);
}
