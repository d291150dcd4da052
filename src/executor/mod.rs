mod collaborator;
mod command;
mod error;
mod pool;
mod retry;

pub use collaborator::{BlockingCollaborator, Collaborator, CollaboratorFactory, Failure, Unconfigured};
pub use command::CommandCollaborator;
pub use error::{Error, Result};
pub use pool::ExecutorPool;
pub use retry::RetryPolicy;

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time;

use self::retry::jitter;
use crate::config::HvConfig;
use crate::liveness::{Lease, LivenessTracker};
use crate::models::{Envelope, ExecutorState, Outcome, Task, TaskResult};
use crate::storage::{ResultStore, Storage, WorkQueue};

/// Tunables shared by every executor of a pool.
#[derive(Debug, Clone)]
pub struct Settings {
    pub retry: RetryPolicy,
    pub task_delay_min: Duration,
    pub task_delay_max: Duration,
    /// Longest a dequeue blocks before the shutdown signal is checked again.
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub lease_ttl: Duration,
    /// How long a published result waits for its caller.
    pub result_ttl: Duration,
    pub startup_retries: u32,
    pub startup_backoff: Duration,
    pub publish_retries: u32,
    pub store_backoff: Duration,
    /// How long [`ExecutorPool::stop`] waits for executors to exit.
    pub stop_grace: Duration,
}

impl From<&HvConfig> for Settings {
    fn from(config: &HvConfig) -> Self {
        let executor = &config.executor;

        Self {
            retry: RetryPolicy {
                max_attempts: executor.max_retries,
                backoff_min: executor.backoff_min,
                backoff_max: executor.backoff_max,
                attempt_timeout: executor.attempt_timeout,
            },
            task_delay_min: executor.task_delay_min,
            task_delay_max: executor.task_delay_max,
            poll_interval: executor.poll_interval,
            heartbeat_interval: executor.heartbeat_interval,
            lease_ttl: executor.lease_ttl,
            result_ttl: config.gateway.result_ttl,
            startup_retries: executor.startup_retries,
            startup_backoff: executor.startup_backoff,
            publish_retries: executor.publish_retries,
            store_backoff: executor.store_backoff,
            stop_grace: executor.stop_grace,
        }
    }
}

/// A long-lived worker: claims tasks, drives its collaborator and publishes
/// exactly one result per claimed task.
pub struct Executor<C> {
    state: Arc<ExecutorState>,
    storage: Arc<dyn Storage>,
    collaborator: C,
    settings: Arc<Settings>,
    shutdown: watch::Receiver<bool>,
    halt: watch::Receiver<bool>,
}

impl<C: Collaborator> Executor<C> {
    /// `shutdown` stops the loop between tasks. `halt` also abandons the task
    /// in progress; the collaborator is still closed.
    pub fn new(
        state: Arc<ExecutorState>,
        storage: Arc<dyn Storage>,
        collaborator: C,
        settings: Arc<Settings>,
        shutdown: watch::Receiver<bool>,
        halt: watch::Receiver<bool>,
    ) -> Self {
        Self {
            state,
            storage,
            collaborator,
            settings,
            shutdown,
            halt,
        }
    }

    pub fn state(&self) -> Arc<ExecutorState> {
        self.state.clone()
    }

    /// Runs until a poison envelope arrives or the shutdown signal flips.
    ///
    /// The collaborator is closed on every exit path once it has been opened.
    pub async fn run(mut self) -> Result<()> {
        self.open().await?;

        let halt = halted(self.halt.clone());
        let served = tokio::select! {
            outcome = self.serve() => Some(outcome),
            _ = halt => None,
        };

        let outcome = served.unwrap_or_else(|| {
            warn!("{} halted with work in progress", self.state.id());
            Ok(())
        });
        self.collaborator.close().await;

        info!("{} stopped", self.state.id());
        outcome
    }

    async fn open(&mut self) -> Result<()> {
        let attempts = self.settings.startup_retries.max(1);

        for attempt in 1..=attempts {
            match self.collaborator.open().await {
                Ok(()) => return Ok(()),
                Err(failure) => {
                    warn!(
                        "{} failed to open collaborator ({}/{}): {}",
                        self.state.id(),
                        attempt,
                        attempts,
                        failure
                    );

                    if attempt == attempts {
                        error!("{} giving up on startup", self.state.id());
                        return Err(Error::startup(failure));
                    }

                    time::sleep(self.settings.startup_backoff * attempt).await;
                }
            }
        }

        Err("no startup attempt was made".into())
    }

    async fn serve(&mut self) -> Result<()> {
        let lease = Arc::new(
            Lease::acquire(
                self.storage.clone(),
                self.state.clone(),
                self.settings.lease_ttl,
            )
            .await?,
        );
        let _heartbeat = LivenessTracker::heartbeat(lease.clone(), self.settings.heartbeat_interval);
        info!("{} started", self.state.id());

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            // Never cancelled: a popped entry must reach `process`.
            match self.storage.dequeue(self.settings.poll_interval).await {
                Ok(Some(Envelope::Task(task))) => {
                    self.process(task).await;

                    if let Err(err) = lease.renew().await {
                        warn!("{} failed to refresh lease: {}", self.state.id(), err);
                    }

                    let delay = jitter(self.settings.task_delay_min, self.settings.task_delay_max);
                    if self.pause(delay).await {
                        break;
                    }
                }
                Ok(Some(Envelope::Shutdown)) => {
                    debug!("{} received shutdown", self.state.id());
                    break;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("{} failed to dequeue: {}", self.state.id(), err);
                    if self.pause(self.settings.store_backoff).await {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Sleeps for `delay` unless shutdown comes first. Returns whether it did.
    async fn pause(&mut self, delay: Duration) -> bool {
        if *self.shutdown.borrow() {
            return true;
        }

        tokio::select! {
            _ = time::sleep(delay) => false,
            _ = self.shutdown.changed() => true,
        }
    }

    async fn process(&mut self, task: Task) {
        let id = self.state.id().clone();
        let started = Instant::now();

        self.state.begin();
        info!("{} claimed {} ({:?})", id, task.id, task.params.query);

        let outcome = self
            .settings
            .retry
            .run(&mut self.collaborator, &task, &self.state)
            .await;

        let success = matches!(outcome, Outcome::Success { .. });
        let result = TaskResult::new(task.id, Some(id.clone()), started.elapsed(), outcome);
        let task_id = result.task_id.clone();

        let published = self.publish(result).await;
        self.state.finish(success && published);

        if published {
            info!(
                "{} published {} ({}) in {:?}",
                id,
                task_id,
                if success { "success" } else { "error" },
                started.elapsed()
            );
        }
    }

    async fn publish(&mut self, result: TaskResult) -> bool {
        let attempts = self.settings.publish_retries.max(1);

        for attempt in 1..=attempts {
            match self.storage.put(result.clone(), self.settings.result_ttl).await {
                Ok(()) => return true,
                Err(err) => {
                    warn!(
                        "{} failed to publish {} ({}/{}): {}",
                        self.state.id(),
                        result.task_id,
                        attempt,
                        attempts,
                        err
                    );

                    if attempt < attempts {
                        time::sleep(self.settings.store_backoff).await;
                    }
                }
            }
        }

        error!("{} lost the result of {}", self.state.id(), result.task_id);
        false
    }
}

/// Resolves once `halt` flips to true. Never resolves if its sender is gone.
async fn halted(mut halt: watch::Receiver<bool>) {
    while !*halt.borrow_and_update() {
        if halt.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::MemoryStorageConfig;
    use crate::models::{ExecutorId, Record, SearchParams};
    use crate::storage::{LeaseStore, MemoryStorage};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn fast_settings() -> Settings {
        Settings {
            retry: RetryPolicy {
                max_attempts: 2,
                backoff_min: Duration::from_millis(1),
                backoff_max: Duration::from_millis(2),
                attempt_timeout: Duration::from_secs(2),
            },
            task_delay_min: Duration::from_millis(1),
            task_delay_max: Duration::from_millis(2),
            poll_interval: Duration::from_millis(20),
            heartbeat_interval: Duration::from_millis(50),
            lease_ttl: Duration::from_secs(5),
            result_ttl: Duration::from_secs(5),
            startup_retries: 2,
            startup_backoff: Duration::from_millis(1),
            publish_retries: 2,
            store_backoff: Duration::from_millis(5),
            stop_grace: Duration::from_secs(2),
        }
    }

    pub(crate) fn memory_storage() -> Arc<MemoryStorage> {
        Arc::new(MemoryStorage::new(&MemoryStorageConfig {
            queue_capacity: 64,
            cache_capacity: 64,
        }))
    }

    /// Fails every attempt and remembers whether it was closed.
    #[derive(Default)]
    struct AlwaysFails {
        calls: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Collaborator for AlwaysFails {
        async fn execute(&mut self, _task: &Task) -> std::result::Result<Vec<Record>, Failure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err("rate limited".into())
        }

        async fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NeverOpens;

    #[async_trait]
    impl Collaborator for NeverOpens {
        async fn open(&mut self) -> std::result::Result<(), Failure> {
            Err("browser did not start".into())
        }

        async fn execute(&mut self, _task: &Task) -> std::result::Result<Vec<Record>, Failure> {
            Ok(vec![json!(1)])
        }
    }

    fn executor<C: Collaborator>(
        storage: Arc<MemoryStorage>,
        collaborator: C,
    ) -> (Executor<C>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let (_, halt) = watch::channel(false);
        let state = Arc::new(ExecutorState::new(ExecutorId::new("test", 0)));
        let executor = Executor::new(state, storage, collaborator, Arc::new(fast_settings()), rx, halt);
        (executor, tx)
    }

    #[tokio::test]
    async fn test_exhausted_task_publishes_error() {
        let storage = memory_storage();
        let collaborator = AlwaysFails::default();
        let calls = collaborator.calls.clone();
        let closed = collaborator.closed.clone();

        let (executor, _shutdown) = executor(storage.clone(), collaborator);
        let state = executor.state();
        let handle = tokio::spawn(executor.run());

        let task = Task::new(SearchParams::new("pizza", "boston", 10));
        storage.enqueue(task.clone().into()).await.unwrap();

        let result = storage
            .take(&task.id, Duration::from_secs(2))
            .await
            .unwrap()
            .expect("a result is always published");

        assert_eq!(result.task_id, task.id);
        assert_eq!(result.executor_id, Some(ExecutorId::new("test", 0)));
        assert_eq!(
            result.outcome,
            Outcome::Error {
                error: "rate limited".to_string()
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        storage.enqueue(Envelope::Shutdown).await.unwrap();
        handle.await.unwrap().unwrap();

        let record = state.snapshot();
        assert_eq!(record.total, 1);
        assert_eq!(record.failed, 1);
        assert_eq!(record.succeeded, 0);
        assert_eq!(record.failed_attempts, 2);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_idle_executor() {
        let storage = memory_storage();
        let collaborator = AlwaysFails::default();
        let closed = collaborator.closed.clone();

        let (executor, shutdown) = executor(storage.clone(), collaborator);
        let handle = tokio::spawn(executor.run());

        time::sleep(Duration::from_millis(30)).await;
        assert_eq!(storage.leases().await.unwrap().len(), 1);

        shutdown.send(true).unwrap();
        time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("executor exits promptly")
            .unwrap()
            .unwrap();

        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_lets_pending_dequeue_finish() {
        let storage = memory_storage();
        let (tx, rx) = watch::channel(false);
        let state = Arc::new(ExecutorState::new(ExecutorId::new("test", 0)));
        let settings = Settings {
            poll_interval: Duration::from_millis(500),
            ..fast_settings()
        };
        let collaborator = BlockingCollaborator::new(
            |params: &SearchParams| -> std::result::Result<Vec<Record>, Failure> {
                Ok(vec![json!(params.query.clone())])
            },
        );
        let (_, halt) = watch::channel(false);
        let executor = Executor::new(state, storage.clone(), collaborator, Arc::new(settings), rx, halt);
        let handle = tokio::spawn(executor.run());

        // let the executor block inside its dequeue, then stop it mid-poll
        time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let task = Task::new(SearchParams::new("late", "x", 1));
        storage.enqueue(task.clone().into()).await.unwrap();

        time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("executor exits after the claimed task")
            .unwrap()
            .unwrap();

        assert_eq!(storage.depth().await.unwrap(), 0);
        let result = storage
            .take(&task.id, Duration::from_millis(10))
            .await
            .unwrap()
            .expect("the claimed task was processed");
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_failed_startup_never_registers() {
        let storage = memory_storage();
        let (executor, _shutdown) = executor(storage.clone(), NeverOpens);

        let err = executor.run().await.unwrap_err();

        assert!(err.is_startup());
        assert!(storage.leases().await.unwrap().is_empty());
    }
}
