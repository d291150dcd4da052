//! Key layout shared by every process pointed at the same Redis.

use crate::models::{ExecutorId, Fingerprint, TaskId};

/// FIFO list of serialized tasks: LPUSH on enqueue, BRPOP on dequeue.
pub(super) const TASK_QUEUE: &str = "scraper:tasks";

/// Poison value that stops the executor popping it.
pub(super) const SHUTDOWN_SENTINEL: &str = "__shutdown__";

pub(super) const RECORD_PATTERN: &str = "worker:*:record";
pub(super) const CACHE_PATTERN: &str = "cache:*";

const RECORD_SUFFIX: &str = ":record";

pub(super) fn result(task_id: &TaskId) -> String {
    format!("scraper:result:{}", task_id)
}

pub(super) fn heartbeat(id: &ExecutorId) -> String {
    format!("worker:{}:heartbeat", id)
}

pub(super) fn record(id: &ExecutorId) -> String {
    format!("worker:{}{}", id, RECORD_SUFFIX)
}

/// Recovers the executor id from a record key.
pub(super) fn executor_of_record(key: &str) -> Option<ExecutorId> {
    key.strip_prefix("worker:")?
        .strip_suffix(RECORD_SUFFIX)
        .map(ExecutorId::from)
}

pub(super) fn cache(fingerprint: &Fingerprint) -> String {
    format!("cache:{}", fingerprint)
}
