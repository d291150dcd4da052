use log::{error, info, warn};
use std::error::Error;
use std::io;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::{HvConfig, StorageType};
use crate::executor::{CommandCollaborator, ExecutorPool, Settings, Unconfigured};
use crate::gateway::{GatewaySettings, RequestGateway};
use crate::models::ExecutorId;
use crate::servers::{HttpServer, State};
use crate::signals::shutdown_signal;
use crate::stats::{GatewayCounters, StatsAggregator};
use crate::storage::{create_new_storage, Storage};

type BoxError = Box<dyn Error + Send + Sync>;

/// Handles to everything [`start`] spawned.
pub struct Running {
    http: Option<(oneshot::Sender<()>, JoinHandle<io::Result<()>>)>,
    pool: Option<ExecutorPool>,
    reporter: Option<JoinHandle<()>>,
}

/// Connects the backing store and starts the components `config.role` asks for.
///
/// An unreachable store is fatal here; later store faults are retried by the components.
pub async fn start(config: Arc<HvConfig>) -> Result<Running, BoxError> {
    let storage = create_new_storage(&config)?;
    storage.ping().await?;

    if config.role.runs_gateway() && !config.role.runs_executors() && storage.kind() == StorageType::Memory {
        warn!("gateway role with in-process storage: no executor can ever serve it");
    }

    let pool = match config.role.runs_executors() {
        true => Some(start_pool(&config, storage.clone())),
        false => None,
    };

    let mut http = None;
    let mut reporter = None;

    if config.role.runs_gateway() {
        let counters = Arc::new(GatewayCounters::default());
        let gateway = RequestGateway::new(
            storage.clone(),
            counters.clone(),
            GatewaySettings::from(config.as_ref()),
        );
        let stats = StatsAggregator::new(storage.clone(), counters);

        let interval = config.gateway.stats_report_interval;
        if !interval.is_zero() {
            reporter = Some(stats.report_every(interval));
        }

        let state = State::new(gateway, stats, config.clone());
        let (stop, stop_receiver) = oneshot::channel();
        let server = tokio::spawn(HttpServer::start(state, shutdown_signal(stop_receiver)));

        http = Some((stop, server));
    }

    info!("Started in {:?} role", config.role);

    Ok(Running {
        http,
        pool,
        reporter,
    })
}

fn start_pool(config: &HvConfig, storage: Arc<dyn Storage>) -> ExecutorPool {
    let node = config.node_name();
    let count = config.executor.count;
    let settings = Settings::from(config);

    match config.executor.command.clone() {
        Some(command) => ExecutorPool::start(
            &node,
            count,
            storage,
            move |_: &ExecutorId| CommandCollaborator::new(command.clone()),
            settings,
        ),
        None => {
            warn!("executor.command is not set: every task will fail");
            ExecutorPool::start(&node, count, storage, |_: &ExecutorId| Unconfigured, settings)
        }
    }
}

impl Running {
    /// Stops the HTTP server first so no new task is created, then the executors.
    pub async fn shutdown(self) {
        if let Some((stop, server)) = self.http {
            let _ = stop.send(());
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!("HTTP server failed: {}", err),
                Err(err) => error!("HTTP server task failed: {}", err),
            }
        }

        if let Some(reporter) = self.reporter {
            reporter.abort();
        }

        if let Some(pool) = self.pool {
            pool.stop().await;
        }

        info!("Shutdown complete");
    }

    /// Resolves when the HTTP server exits on its own, or never when there is none.
    pub async fn server_exited(&mut self) {
        match self.http {
            Some((_, ref mut server)) => {
                match server.await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => error!("HTTP server failed: {}", err),
                    Err(err) => error!("HTTP server task failed: {}", err),
                }
                self.http = None;
            }
            None => std::future::pending().await,
        }
    }
}
