use hv_utils::time::epoch_millis;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const WORKER_SEPARATOR: &str = ":worker-";

/// Identity of one executor, `{node}:worker-{index}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutorId(String);

impl ExecutorId {
    pub fn new(node: &str, index: usize) -> Self {
        Self(format!("{}{}{}", node, WORKER_SEPARATOR, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The host part of the id.
    pub fn node(&self) -> &str {
        match self.0.rfind(WORKER_SEPARATOR) {
            Some(pos) => &self.0[..pos],
            None => &self.0,
        }
    }
}

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Point-in-time view of one executor, published with its lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorRecord {
    pub id: ExecutorId,
    pub node: String,
    pub busy: bool,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Collaborator attempts that failed, across all tasks.
    pub failed_attempts: u64,
    /// Unix epoch milliseconds.
    pub last_heartbeat: u64,
}

/// Live counters of one executor.
///
/// Only the owning executor mutates them; everyone else reads a [`snapshot`](Self::snapshot).
#[derive(Debug)]
pub struct ExecutorState {
    id: ExecutorId,
    busy: AtomicBool,
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    failed_attempts: AtomicU64,
}

impl ExecutorState {
    pub fn new(id: ExecutorId) -> Self {
        Self {
            id,
            busy: AtomicBool::new(false),
            total: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &ExecutorId {
        &self.id
    }

    pub(crate) fn begin(&self) {
        self.busy.store(true, Ordering::Release);
    }

    pub(crate) fn attempt_failed(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn finish(&self, success: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        match success {
            true => self.succeeded.fetch_add(1, Ordering::Relaxed),
            false => self.failed.fetch_add(1, Ordering::Relaxed),
        };
        self.busy.store(false, Ordering::Release);
    }

    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ExecutorRecord {
        ExecutorRecord {
            id: self.id.clone(),
            node: self.id.node().to_string(),
            busy: self.busy.load(Ordering::Acquire),
            total: self.total.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            last_heartbeat: epoch_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_id_layout() {
        let id = ExecutorId::new("scraper-01", 3);

        assert_eq!(id.as_str(), "scraper-01:worker-3");
        assert_eq!(id.node(), "scraper-01");
    }

    #[test]
    fn test_node_with_colons() {
        let id = ExecutorId::new("10.0.0.1:9000", 0);
        assert_eq!(id.node(), "10.0.0.1:9000");
    }

    #[test]
    fn test_counters_update_per_task() {
        let state = ExecutorState::new(ExecutorId::new("n", 0));

        state.begin();
        assert!(state.snapshot().busy);
        state.attempt_failed();
        state.finish(true);

        state.begin();
        state.attempt_failed();
        state.attempt_failed();
        state.finish(false);

        let record = state.snapshot();
        assert!(!record.busy);
        assert_eq!(record.total, 2);
        assert_eq!(record.succeeded, 1);
        assert_eq!(record.failed, 1);
        assert_eq!(record.failed_attempts, 3);
        assert_eq!(record.node, "n");
    }
}
