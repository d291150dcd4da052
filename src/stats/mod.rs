//! Read-only rollups over executors, queue, cache and gateway counters.

use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::StorageType;
use crate::liveness::Monitor;
use crate::storage::{self, CacheStore, LeaseInfo, Storage, WorkQueue};

/// `numerator / denominator * 100` rounded to two decimals, or `0` when the
/// denominator is zero.
pub fn percentage(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }

    (numerator as f64 / denominator as f64 * 10_000.0).round() / 100.0
}

/// Request counters of one gateway.
#[derive(Debug, Default)]
pub struct GatewayCounters {
    total_requests: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub total_requests: u64,
    pub successful: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl GatewayCounters {
    pub(crate) fn request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn success(&self) {
        self.successful.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A timeout is also a failure.
    pub(crate) fn timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        self.failure();
    }

    pub(crate) fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

impl CounterSnapshot {
    pub fn success_rate(&self) -> f64 {
        percentage(self.successful, self.total_requests)
    }

    pub fn cache_hit_rate(&self) -> f64 {
        percentage(self.cache_hits, self.cache_hits + self.cache_misses)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayStats {
    #[serde(flatten)]
    pub counters: CounterSnapshot,
    pub success_rate: f64,
    pub cache_hit_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutorStats {
    /// Executors holding a live lease.
    pub active: usize,
    pub busy: usize,
    pub idle: usize,
    pub tasks_total: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    pub executors: usize,
    pub busy: usize,
    pub tasks_total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub storage: StorageType,
    pub queue_depth: usize,
    pub cached_results: usize,
    pub executors: ExecutorStats,
    pub nodes: BTreeMap<String, NodeStats>,
    pub gateway: GatewayStats,
}

impl ExecutorStats {
    fn from_leases(leases: &[LeaseInfo]) -> Self {
        let mut stats = ExecutorStats {
            active: leases.len(),
            ..Default::default()
        };

        for lease in leases {
            let record = &lease.record;
            if record.busy {
                stats.busy += 1;
            }
            stats.tasks_total += record.total;
            stats.tasks_succeeded += record.succeeded;
            stats.tasks_failed += record.failed;
        }

        stats.idle = stats.active - stats.busy;
        stats.success_rate = percentage(stats.tasks_succeeded, stats.tasks_total);
        stats
    }
}

fn group_by_node(leases: &[LeaseInfo]) -> BTreeMap<String, NodeStats> {
    let mut nodes: BTreeMap<String, NodeStats> = BTreeMap::new();

    for lease in leases {
        let node = nodes.entry(lease.record.node.clone()).or_default();
        node.executors += 1;
        node.tasks_total += lease.record.total;
        if lease.record.busy {
            node.busy += 1;
        }
    }

    nodes
}

/// Builds [`StatsSnapshot`]s. Never mutates what it reads.
#[derive(Clone)]
pub struct StatsAggregator {
    storage: Arc<dyn Storage>,
    monitor: Monitor,
    counters: Arc<GatewayCounters>,
}

impl StatsAggregator {
    pub fn new(storage: Arc<dyn Storage>, counters: Arc<GatewayCounters>) -> Self {
        Self {
            monitor: Monitor::new(storage.clone()),
            storage,
            counters,
        }
    }

    pub async fn snapshot(&self) -> storage::Result<StatsSnapshot> {
        let (leases, queue_depth, cached_results) = tokio::try_join!(
            self.monitor.executors(),
            self.storage.depth(),
            self.storage.cache_len()
        )?;

        let counters = self.counters.snapshot();

        Ok(StatsSnapshot {
            storage: self.storage.kind(),
            queue_depth,
            cached_results,
            executors: ExecutorStats::from_leases(&leases),
            nodes: group_by_node(&leases),
            gateway: GatewayStats {
                success_rate: counters.success_rate(),
                cache_hit_rate: counters.cache_hit_rate(),
                counters,
            },
        })
    }

    /// Logs a snapshot every `interval` until the handle is aborted.
    pub fn report_every(&self, interval: Duration) -> JoinHandle<()> {
        let aggregator = self.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match aggregator.snapshot().await {
                    Ok(stats) => info!(
                        "stats: executors {} (busy {}), queue {}, requests {} (ok {}, failed {}, timeouts {}), cache hit rate {}%",
                        stats.executors.active,
                        stats.executors.busy,
                        stats.queue_depth,
                        stats.gateway.counters.total_requests,
                        stats.gateway.counters.successful,
                        stats.gateway.counters.failed,
                        stats.gateway.counters.timeouts,
                        stats.gateway.cache_hit_rate
                    ),
                    Err(err) => warn!("stats unavailable: {}", err),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStorageConfig;
    use crate::models::{ExecutorId, ExecutorRecord, SearchParams, Task};
    use crate::storage::{LeaseStore, MemoryStorage};

    fn record(node: &str, index: usize, busy: bool, total: u64, succeeded: u64) -> ExecutorRecord {
        ExecutorRecord {
            id: ExecutorId::new(node, index),
            node: node.to_string(),
            busy,
            total,
            succeeded,
            failed: total - succeeded,
            failed_attempts: 0,
            last_heartbeat: 0,
        }
    }

    #[test]
    fn test_percentage_guards_zero() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(5, 0), 0.0);
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 2), 100.0);
    }

    #[test]
    fn test_empty_counters_have_zero_rates() {
        let counters = GatewayCounters::default().snapshot();

        assert_eq!(counters.success_rate(), 0.0);
        assert_eq!(counters.cache_hit_rate(), 0.0);
        assert_eq!(ExecutorStats::from_leases(&[]).success_rate, 0.0);
    }

    #[test]
    fn test_counters() {
        let counters = GatewayCounters::default();
        counters.request();
        counters.cache_miss();
        counters.timeout();
        counters.request();
        counters.cache_hit();
        counters.success();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.success_rate(), 50.0);
        assert_eq!(snapshot.cache_hit_rate(), 50.0);
    }

    #[tokio::test]
    async fn test_snapshot_rolls_up_executors_by_node() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(&MemoryStorageConfig {
            queue_capacity: 8,
            cache_capacity: 8,
        }));
        let ttl = Duration::from_secs(60);

        for record in [
            record("a", 0, true, 4, 3),
            record("a", 1, false, 6, 6),
            record("b", 0, false, 0, 0),
        ] {
            storage.renew(&record, ttl).await.unwrap();
        }
        storage
            .enqueue(Task::new(SearchParams::new("q", "l", 1)).into())
            .await
            .unwrap();

        let aggregator = StatsAggregator::new(storage, Arc::new(GatewayCounters::default()));
        let stats = aggregator.snapshot().await.unwrap();

        assert_eq!(stats.storage, StorageType::Memory);
        assert_eq!(stats.queue_depth, 1);
        assert_eq!(stats.cached_results, 0);
        assert_eq!(stats.executors.active, 3);
        assert_eq!(stats.executors.busy, 1);
        assert_eq!(stats.executors.idle, 2);
        assert_eq!(stats.executors.tasks_total, 10);
        assert_eq!(stats.executors.success_rate, 90.0);
        assert_eq!(
            stats.nodes["a"],
            NodeStats {
                executors: 2,
                busy: 1,
                tasks_total: 10
            }
        );
        assert_eq!(stats.nodes["b"].executors, 1);
        assert_eq!(stats.gateway.cache_hit_rate, 0.0);
    }
}
