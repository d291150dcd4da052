use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::models::{ExecutorId, Record, SearchParams, Task};

/// Why one collaborator attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    reason: String,
    permanent: bool,
}

impl Failure {
    /// A failure worth retrying.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            permanent: false,
        }
    }

    /// A failure that no retry can fix.
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            permanent: true,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for Failure {}

impl From<&str> for Failure {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

impl From<String> for Failure {
    fn from(reason: String) -> Self {
        Self::new(reason)
    }
}

/// The external capability an executor drives for each task.
///
/// One instance belongs to one executor, so it may keep a session (a browser,
/// a connection) between tasks.
#[async_trait]
pub trait Collaborator: Send + 'static {
    /// Prepares the session. Called once before the first task.
    async fn open(&mut self) -> Result<(), Failure> {
        Ok(())
    }

    /// Performs the lookup. Records must come back in the order they were produced.
    async fn execute(&mut self, task: &Task) -> Result<Vec<Record>, Failure>;

    /// Releases the session. Called on every exit path after a successful `open`.
    async fn close(&mut self) {}
}

/// Builds one collaborator per executor.
pub trait CollaboratorFactory: Send + Sync + 'static {
    type Collaborator: Collaborator;

    fn create(&self, id: &ExecutorId) -> Self::Collaborator;
}

impl<F, C> CollaboratorFactory for F
where
    F: Fn(&ExecutorId) -> C + Send + Sync + 'static,
    C: Collaborator,
{
    type Collaborator = C;

    fn create(&self, id: &ExecutorId) -> C {
        self(id)
    }
}

/// Runs a synchronous lookup on the blocking thread pool.
pub struct BlockingCollaborator<F> {
    lookup: Arc<F>,
}

impl<F> BlockingCollaborator<F>
where
    F: Fn(&SearchParams) -> Result<Vec<Record>, Failure> + Send + Sync + 'static,
{
    pub fn new(lookup: F) -> Self {
        Self {
            lookup: Arc::new(lookup),
        }
    }
}

impl<F> Clone for BlockingCollaborator<F> {
    fn clone(&self) -> Self {
        Self {
            lookup: self.lookup.clone(),
        }
    }
}

#[async_trait]
impl<F> Collaborator for BlockingCollaborator<F>
where
    F: Fn(&SearchParams) -> Result<Vec<Record>, Failure> + Send + Sync + 'static,
{
    async fn execute(&mut self, task: &Task) -> Result<Vec<Record>, Failure> {
        let lookup = self.lookup.clone();
        let params = task.params.clone();

        tokio::task::spawn_blocking(move || lookup(&params))
            .await
            .map_err(|err| Failure::new(format!("lookup panicked: {}", err)))?
    }
}

/// Stands in when nothing is configured: every task fails without retries.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unconfigured;

#[async_trait]
impl Collaborator for Unconfigured {
    async fn execute(&mut self, _task: &Task) -> Result<Vec<Record>, Failure> {
        Err(Failure::permanent("no collaborator configured"))
    }
}
