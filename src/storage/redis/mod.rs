mod keys;
mod manager;

use async_trait::async_trait;
use hv_utils::time::epoch_millis;
use log::warn;
use redis::cmd;
use std::time::Duration;
use tokio::time::{self, Instant};

use self::manager::{ConnectionPool, PooledConnection};
use super::{
    deadline_after, decode, encode, CacheStore, LeaseInfo, LeaseStore, Result, ResultStore, Storage, WorkQueue,
};
use crate::{
    config::{RedisStorageConfig, StorageType},
    models::{
        CacheEntry, Envelope, ExecutorId, ExecutorRecord, Fingerprint, Outcome, Task, TaskId,
        TaskResult,
    },
};

/// Multi-host backend: gateways and executors on any host share one Redis.
#[derive(Debug)]
pub struct RedisStorage {
    pool: ConnectionPool,
    result_poll_interval: Duration,
}

impl RedisStorage {
    pub fn new(config: &RedisStorageConfig) -> Result<Self> {
        let pool = ConnectionPool::new(&config.url, config.max_idle_connections)?;

        Ok(Self {
            pool,
            result_poll_interval: config.result_poll_interval,
        })
    }

    pub async fn get_connection(&self) -> Result<PooledConnection<'_>> {
        self.pool.get().await
    }
}

#[inline]
fn millis(duration: Duration) -> u64 {
    (duration.as_millis() as u64).max(1)
}

/// Decodes a popped queue entry. A malformed entry is logged and skipped.
fn parse_entry(raw: &str) -> Option<Envelope> {
    if raw == keys::SHUTDOWN_SENTINEL {
        return Some(Envelope::Shutdown);
    }

    match decode::<Task>(raw) {
        Ok(task) => Some(Envelope::Task(task)),
        Err(err) => {
            warn!("skipping malformed queue entry: {} ({:?})", err, raw);
            None
        }
    }
}

/// Decodes a taken result. The stored copy is already deleted, so an
/// unreadable one still answers its caller, as an error outcome.
fn read_result(task_id: &TaskId, raw: &str) -> TaskResult {
    match decode::<TaskResult>(raw) {
        Ok(result) => result,
        Err(err) => {
            warn!("unreadable result for {}: {}", task_id, err);
            TaskResult::new(
                task_id.clone(),
                None,
                Duration::ZERO,
                Outcome::Error {
                    error: format!("unreadable result: {}", err),
                },
            )
        }
    }
}

#[async_trait]
impl WorkQueue for RedisStorage {
    async fn enqueue(&self, envelope: Envelope) -> Result<()> {
        let payload = match envelope {
            Envelope::Task(ref task) => encode(task)?,
            Envelope::Shutdown => keys::SHUTDOWN_SENTINEL.to_string(),
        };

        self.get_connection()
            .await?
            .run::<()>(cmd("LPUSH").arg(keys::TASK_QUEUE).arg(payload))
            .await
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<Envelope>> {
        let popped: Option<(String, String)> = self
            .get_connection()
            .await?
            .run(
                cmd("BRPOP")
                    .arg(keys::TASK_QUEUE)
                    .arg(timeout.as_secs_f64().max(0.01)),
            )
            .await?;

        Ok(popped.and_then(|(_, raw)| parse_entry(&raw)))
    }

    async fn depth(&self) -> Result<usize> {
        self.get_connection()
            .await?
            .run(cmd("LLEN").arg(keys::TASK_QUEUE))
            .await
    }
}

#[async_trait]
impl ResultStore for RedisStorage {
    async fn put(&self, result: TaskResult, ttl: Duration) -> Result<()> {
        let payload = encode(&result)?;

        self.get_connection()
            .await?
            .run::<()>(
                cmd("PSETEX")
                    .arg(keys::result(&result.task_id))
                    .arg(millis(ttl))
                    .arg(payload),
            )
            .await
    }

    async fn take(&self, task_id: &TaskId, timeout: Duration) -> Result<Option<TaskResult>> {
        let key = keys::result(task_id);
        let deadline = deadline_after(Instant::now(), timeout);

        let mut pipe = redis::pipe();
        pipe.atomic().get(&key).del(&key).ignore();

        loop {
            let (raw,): (Option<String>,) = self.get_connection().await?.run_pipe(&pipe).await?;

            if let Some(raw) = raw {
                return Ok(Some(read_result(task_id, &raw)));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            time::sleep(self.result_poll_interval.min(deadline - now)).await;
        }
    }
}

#[async_trait]
impl LeaseStore for RedisStorage {
    async fn renew(&self, record: &ExecutorRecord, ttl: Duration) -> Result<()> {
        let ttl = millis(ttl);
        let payload = encode(record)?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("PSETEX")
            .arg(keys::heartbeat(&record.id))
            .arg(ttl)
            .arg(epoch_millis())
            .ignore()
            .cmd("PSETEX")
            .arg(keys::record(&record.id))
            .arg(ttl)
            .arg(payload)
            .ignore();

        self.get_connection().await?.run_pipe::<()>(&pipe).await
    }

    async fn remaining(&self, id: &ExecutorId) -> Result<Option<Duration>> {
        let pttl: i64 = self
            .get_connection()
            .await?
            .run(cmd("PTTL").arg(keys::heartbeat(id)))
            .await?;

        // -2: missing, -1: no expiry (never written by us)
        Ok((pttl > 0).then(|| Duration::from_millis(pttl as u64)))
    }

    async fn leases(&self) -> Result<Vec<LeaseInfo>> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<ExecutorId> = conn
            .scan_keys(keys::RECORD_PATTERN)
            .await?
            .iter()
            .filter_map(|key| keys::executor_of_record(key))
            .collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.get(keys::record(id)).cmd("PTTL").arg(keys::heartbeat(id));
        }

        let rows: Vec<(Option<String>, i64)> = conn.run_pipe(&pipe).await?;

        let leases = ids
            .into_iter()
            .zip(rows)
            .filter_map(|(id, (raw, pttl))| {
                let raw = raw.filter(|_| pttl > 0)?;
                match decode::<ExecutorRecord>(&raw) {
                    Ok(record) => Some(LeaseInfo {
                        record,
                        remaining: Duration::from_millis(pttl as u64),
                    }),
                    Err(err) => {
                        warn!("skipping malformed record of {}: {}", id, err);
                        None
                    }
                }
            })
            .collect();

        Ok(leases)
    }
}

#[async_trait]
impl CacheStore for RedisStorage {
    async fn cache_get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let raw: Option<String> = self
            .get_connection()
            .await?
            .run(cmd("GET").arg(keys::cache(fingerprint)))
            .await?;

        raw.as_deref().map(decode).transpose()
    }

    async fn cache_set(&self, entry: CacheEntry) -> Result<()> {
        let payload = encode(&entry)?;

        self.get_connection()
            .await?
            .run::<()>(
                cmd("PSETEX")
                    .arg(keys::cache(&entry.fingerprint))
                    .arg(millis(entry.ttl))
                    .arg(payload),
            )
            .await
    }

    async fn cache_clear(&self) -> Result<usize> {
        let mut conn = self.get_connection().await?;
        let keys = conn.scan_keys(keys::CACHE_PATTERN).await?;

        let mut removed = 0;
        for chunk in keys.chunks(500) {
            let count: usize = conn.run(cmd("DEL").arg(chunk)).await?;
            removed += count;
        }

        Ok(removed)
    }

    async fn cache_len(&self) -> Result<usize> {
        let mut conn = self.get_connection().await?;
        Ok(conn.scan_keys(keys::CACHE_PATTERN).await?.len())
    }
}

#[async_trait]
impl Storage for RedisStorage {
    fn kind(&self) -> StorageType {
        StorageType::Redis
    }

    async fn ping(&self) -> Result<()> {
        let pong: String = self.get_connection().await?.run(&cmd("PING")).await?;
        match pong.as_str() {
            "PONG" => Ok(()),
            _ => Err(format!("unexpected ping reply: {}", pong).into()),
        }
    }
}
