use hv_utils::time::epoch_millis;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{executor::ExecutorId, task::TaskId};

/// One opaque record produced by the collaborator. Its contents are never interpreted.
pub type Record = serde_json::Value;

/// Tagged outcome of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// Records in the order the collaborator produced them.
    Success { payload: Vec<Record> },
    Error { error: String },
    /// No result was correlated before the deadline.
    Timeout,
}

impl Outcome {
    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::Error { .. } => "error",
            Outcome::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    /// Absent when the gateway synthesized the result itself.
    pub executor_id: Option<ExecutorId>,
    /// Unix epoch milliseconds.
    pub produced_at: u64,
    #[serde(rename = "elapsed_ms", with = "hv_utils::serde::duration_millis")]
    pub elapsed: Duration,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl TaskResult {
    pub fn new(
        task_id: TaskId,
        executor_id: Option<ExecutorId>,
        elapsed: Duration,
        outcome: Outcome,
    ) -> Self {
        Self {
            task_id,
            executor_id,
            produced_at: epoch_millis(),
            elapsed,
            outcome,
        }
    }

    pub fn timeout(task_id: TaskId, elapsed: Duration) -> Self {
        Self::new(task_id, None, elapsed, Outcome::Timeout)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn payload(&self) -> Option<&[Record]> {
        match self.outcome {
            Outcome::Success { ref payload } => Some(payload),
            _ => None,
        }
    }
}

/// What the gateway hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(flatten)]
    pub result: TaskResult,
    pub from_cache: bool,
}

impl Reply {
    pub fn fresh(result: TaskResult) -> Self {
        Self {
            result,
            from_cache: false,
        }
    }

    pub fn cached(result: TaskResult) -> Self {
        Self {
            result,
            from_cache: true,
        }
    }

    pub fn outcome(&self) -> &Outcome {
        &self.result.outcome
    }
}
