use hv_utils::time::epoch_millis;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::cache::Fingerprint;

/// Unique token identifying one dispatched task.
///
/// Ids are `task:` followed by a random v4 UUID, so an id is never reused
/// while a result or cache entry could still reference it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        Self(format!("task:{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The parameters that fully determine the answer of a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub query: String,
    pub location: String,
    pub limit: u32,
}

impl SearchParams {
    pub fn new(query: impl Into<String>, location: impl Into<String>, limit: u32) -> Self {
        Self {
            query: query.into(),
            location: location.into(),
            limit,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(&self.query, &self.location, self.limit)
    }
}

/// A unit of dispatched work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(flatten)]
    pub params: SearchParams,
    /// Unix epoch milliseconds.
    pub submitted_at: u64,
}

impl Task {
    pub fn new(params: SearchParams) -> Self {
        Self {
            id: TaskId::generate(),
            params,
            submitted_at: epoch_millis(),
        }
    }
}

/// What travels through a work queue: a task, or the poison value that stops
/// the executor receiving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Task(Task),
    Shutdown,
}

impl Envelope {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Envelope::Shutdown)
    }
}

impl From<Task> for Envelope {
    fn from(task: Task) -> Self {
        Envelope::Task(task)
    }
}
