mod cache;
mod error;

pub use cache::ResultCache;
pub use error::DispatchError;

use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;

use crate::config::HvConfig;
use crate::liveness::Monitor;
use crate::models::{Envelope, Outcome, Reply, SearchParams, Task, TaskId, TaskResult};
use crate::stats::GatewayCounters;
use crate::storage::{self, ResultStore, Storage, WorkQueue};

/// One caller request, before validation and limit normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub query: String,
    pub location: String,
    /// Falls back to the configured default when absent.
    pub limit: Option<u32>,
    pub use_cache: bool,
    /// Falls back to the configured dispatch timeout when absent.
    pub timeout: Option<Duration>,
}

impl DispatchRequest {
    pub fn new(query: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            location: location.into(),
            limit: None,
            use_cache: true,
            timeout: None,
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub dispatch_timeout: Duration,
    /// Upper bound for a caller-supplied timeout.
    pub max_timeout: Duration,
    pub default_limit: u32,
    pub max_limit: u32,
    pub cache_ttl: Duration,
    pub enqueue_retries: u32,
    pub store_backoff: Duration,
}

impl From<&HvConfig> for GatewaySettings {
    fn from(config: &HvConfig) -> Self {
        let gateway = &config.gateway;

        Self {
            dispatch_timeout: gateway.dispatch_timeout,
            max_timeout: gateway.max_timeout,
            default_limit: gateway.default_limit,
            max_limit: gateway.max_limit,
            cache_ttl: gateway.cache_ttl,
            enqueue_retries: gateway.enqueue_retries,
            store_backoff: gateway.store_backoff,
        }
    }
}

/// Caller-facing entry point: cache lookup, task creation and the
/// correlation wait for its result.
#[derive(Clone)]
pub struct RequestGateway {
    storage: Arc<dyn Storage>,
    cache: ResultCache,
    monitor: Monitor,
    counters: Arc<GatewayCounters>,
    settings: Arc<GatewaySettings>,
}

impl RequestGateway {
    pub fn new(
        storage: Arc<dyn Storage>,
        counters: Arc<GatewayCounters>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            cache: ResultCache::new(storage.clone(), settings.cache_ttl),
            monitor: Monitor::new(storage.clone()),
            storage,
            counters,
            settings: Arc::new(settings),
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn counters(&self) -> &Arc<GatewayCounters> {
        &self.counters
    }

    pub async fn ping(&self) -> storage::Result<()> {
        self.storage.ping().await
    }

    /// Trims the text fields and clamps the limit into `1..=max_limit`.
    pub fn normalize(&self, request: &DispatchRequest) -> Result<SearchParams, DispatchError> {
        let query = request.query.trim();
        let location = request.location.trim();

        if query.is_empty() || location.is_empty() {
            return Err(DispatchError::Validation(
                "missing required parameters: query and location".to_string(),
            ));
        }

        let limit = request
            .limit
            .unwrap_or(self.settings.default_limit)
            .clamp(1, self.settings.max_limit.max(1));

        Ok(SearchParams::new(query, location, limit))
    }

    /// Resolves one request into a reply.
    ///
    /// A successful result is cached. Error and timeout replies are not. A
    /// timeout abandons the task: its result, if it ever arrives, expires unread.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<Reply, DispatchError> {
        let params = self.normalize(&request)?;
        let started = Instant::now();
        self.counters.request();

        let reply = self.resolve(params, &request).await;
        match reply {
            Ok(ref reply) => match reply.outcome() {
                Outcome::Success { .. } => self.counters.success(),
                Outcome::Error { .. } => self.counters.failure(),
                Outcome::Timeout => self.counters.timeout(),
            },
            Err(_) => self.counters.failure(),
        }

        debug!("dispatch finished in {:?}", started.elapsed());
        reply
    }

    async fn resolve(
        &self,
        params: SearchParams,
        request: &DispatchRequest,
    ) -> Result<Reply, DispatchError> {
        let fingerprint = params.fingerprint();

        if request.use_cache {
            if let Some(entry) = self.cache.get(&fingerprint).await {
                info!("cache hit for {:?} in {:?}", params.query, params.location);
                self.counters.cache_hit();
                return Ok(Reply::cached(entry.result));
            }

            self.counters.cache_miss();
        }

        if self.monitor.active_count().await? == 0 {
            warn!("no executors available for {:?}", params.query);
            return Err(DispatchError::NoExecutorAvailable);
        }

        let task = Task::new(params);
        let task_id = task.id.clone();
        self.enqueue(task).await?;
        info!("dispatched {}", task_id);

        let timeout = request
            .timeout
            .unwrap_or(self.settings.dispatch_timeout)
            .min(self.settings.max_timeout);
        let started = Instant::now();

        let result = match self.wait_for(&task_id, timeout).await? {
            Some(result) => result,
            None => {
                let elapsed = started.elapsed();
                warn!("{} timed out after {:?}", task_id, elapsed);
                return Ok(Reply::fresh(TaskResult::timeout(task_id, elapsed)));
            }
        };

        if result.is_success() {
            self.cache.set(fingerprint, result.clone()).await;
        }

        Ok(Reply::fresh(result))
    }

    /// Takes the result of `task_id`, riding out store faults until `timeout`.
    async fn wait_for(&self, task_id: &TaskId, timeout: Duration) -> storage::Result<Option<TaskResult>> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());

            match self.storage.take(task_id, remaining).await {
                Ok(found) => return Ok(found),
                Err(err) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining <= self.settings.store_backoff {
                        return Err(err);
                    }

                    warn!("waiting for {} failed, retrying: {}", task_id, err);
                    time::sleep(self.settings.store_backoff).await;
                }
            }
        }
    }

    async fn enqueue(&self, task: Task) -> storage::Result<()> {
        let attempts = self.settings.enqueue_retries.max(1);
        let mut attempt = 1;

        loop {
            match self.storage.enqueue(Envelope::Task(task.clone())).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < attempts => {
                    warn!(
                        "enqueue of {} failed ({}/{}): {}",
                        task.id, attempt, attempts, err
                    );
                    time::sleep(self.settings.store_backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
