use futures::future::join_all;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

use super::{CollaboratorFactory, Executor, Result, Settings};
use crate::config::StorageType;
use crate::models::{Envelope, ExecutorId, ExecutorState};
use crate::storage::{Storage, WorkQueue};

/// A fixed set of executors started by one process.
pub struct ExecutorPool {
    storage: Arc<dyn Storage>,
    states: Vec<Arc<ExecutorState>>,
    handles: Vec<JoinHandle<Result<()>>>,
    shutdown: watch::Sender<bool>,
    halt: watch::Sender<bool>,
    settings: Arc<Settings>,
}

impl ExecutorPool {
    /// Spawns `count` executors named `{node}:worker-{index}`.
    pub fn start<F: CollaboratorFactory>(
        node: &str,
        count: usize,
        storage: Arc<dyn Storage>,
        factory: F,
        settings: Settings,
    ) -> Self {
        let (shutdown, signal) = watch::channel(false);
        let (halt, halt_signal) = watch::channel(false);
        let settings = Arc::new(settings);

        let mut states = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);

        for index in 0..count {
            let id = ExecutorId::new(node, index);
            let state = Arc::new(ExecutorState::new(id.clone()));
            let executor = Executor::new(
                state.clone(),
                storage.clone(),
                factory.create(&id),
                settings.clone(),
                signal.clone(),
                halt_signal.clone(),
            );

            handles.push(tokio::spawn(async move {
                let outcome = executor.run().await;
                if let Err(ref err) = outcome {
                    error!("{} exited: {}", id, err);
                }
                outcome
            }));
            states.push(state);
        }

        info!("Started {} executors on {}", count, node);

        Self {
            storage,
            states,
            handles,
            shutdown,
            halt,
            settings,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[Arc<ExecutorState>] {
        &self.states
    }

    /// Stops every executor and waits for them, up to the configured grace period.
    ///
    /// With the in-process store each executor gets a poison envelope behind
    /// the tasks already queued, so the queue drains first. A shared store may
    /// deliver poison to executors of other processes, so there the shutdown
    /// signal is flipped instead and executors exit after their current task.
    ///
    /// Executors still running after the grace period are halted: they drop
    /// the task in progress and close their collaborator. Only those that do
    /// not close within a second grace period are aborted.
    pub async fn stop(mut self) {
        match self.storage.kind() {
            StorageType::Memory => {
                for _ in 0..self.handles.len() {
                    if let Err(err) = self.storage.enqueue(Envelope::Shutdown).await {
                        warn!("Failed to enqueue shutdown: {}", err);
                        let _ = self.shutdown.send(true);
                        break;
                    }
                }
            }
            _ => {
                let _ = self.shutdown.send(true);
            }
        }

        let grace = self.settings.stop_grace;

        if time::timeout(grace, join_all(self.handles.iter_mut())).await.is_err() {
            warn!("Executors did not stop within {:?}, halting", grace);
            let _ = self.halt.send(true);
            self.handles.retain(|handle| !handle.is_finished());

            if time::timeout(grace, join_all(self.handles.iter_mut())).await.is_err() {
                warn!("Executors did not close within {:?}, aborting", grace);
                self.handles.iter().for_each(|handle| handle.abort());
            }
        }

        info!("Executor pool stopped");
    }
}
