//! Executor liveness through expiring leases.
//!
//! An executor keeps its lease alive by renewing it on a fixed interval. There
//! is no deregistration: an executor that stops renewing is considered gone
//! once its lease runs out, whichever store backs it.

use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::models::{ExecutorId, ExecutorState};
use crate::storage::{self, LeaseInfo, LeaseStore, Storage};

/// A time-bounded liveness claim held by one executor.
pub struct Lease {
    storage: Arc<dyn Storage>,
    state: Arc<ExecutorState>,
    ttl: Duration,
}

impl Lease {
    /// Takes the lease by writing it for the first time.
    pub async fn acquire(
        storage: Arc<dyn Storage>,
        state: Arc<ExecutorState>,
        ttl: Duration,
    ) -> storage::Result<Self> {
        let lease = Self {
            storage,
            state,
            ttl,
        };
        lease.renew().await?;
        Ok(lease)
    }

    pub fn id(&self) -> &ExecutorId {
        self.state.id()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Extends the lease by another `ttl`, publishing fresh counters with it.
    pub async fn renew(&self) -> storage::Result<()> {
        self.storage.renew(&self.state.snapshot(), self.ttl).await
    }

    pub async fn remaining(&self) -> storage::Result<Option<Duration>> {
        self.storage.remaining(self.id()).await
    }

    pub async fn expired(&self) -> storage::Result<bool> {
        Ok(self.remaining().await?.is_none())
    }
}

/// Background renewal of a lease. Renewal stops when this is dropped.
#[derive(Debug)]
pub struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct LivenessTracker;

impl LivenessTracker {
    /// Renews `lease` every `interval` until the returned [`Heartbeat`] is dropped.
    ///
    /// A failed renewal is logged and retried on the next tick.
    pub fn heartbeat(lease: Arc<Lease>, interval: Duration) -> Heartbeat {
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires at once and the lease is already fresh.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match lease.renew().await {
                    Ok(()) => debug!("{} heartbeat", lease.id()),
                    Err(err) => warn!("{} heartbeat failed: {}", lease.id(), err),
                }
            }
        });

        Heartbeat { handle }
    }
}

/// Read-only view of which executors hold a live lease.
#[derive(Clone)]
pub struct Monitor {
    storage: Arc<dyn Storage>,
}

impl Monitor {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn is_active(&self, id: &ExecutorId) -> storage::Result<bool> {
        Ok(self.storage.remaining(id).await?.is_some())
    }

    /// Every executor whose lease is still live, ordered by id.
    pub async fn executors(&self) -> storage::Result<Vec<LeaseInfo>> {
        let mut leases = self.storage.leases().await?;
        leases.sort_by(|a, b| a.record.id.cmp(&b.record.id));
        Ok(leases)
    }

    pub async fn active_count(&self) -> storage::Result<usize> {
        Ok(self.storage.leases().await?.len())
    }
}
