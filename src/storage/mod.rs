use crate::config::{HvConfig, StorageType};
use crate::models::{
    CacheEntry, Envelope, ExecutorId, ExecutorRecord, Fingerprint, TaskId, TaskResult,
};
use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

mod memory;
pub use self::memory::MemoryStorage;

#[cfg(feature = "redis-store")]
mod redis;

#[cfg(feature = "redis-store")]
pub use self::redis::RedisStorage;

/// Exclusive hand-off of tasks to executors.
///
/// Every envelope is received by exactly one caller of [`dequeue`](WorkQueue::dequeue).
#[async_trait]
pub trait WorkQueue: Sync + Send {
    async fn enqueue(&self, envelope: Envelope) -> Result<()>;

    /// Waits up to `timeout` for the next envelope.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<Envelope>>;

    /// Number of envelopes waiting to be claimed.
    async fn depth(&self) -> Result<usize>;
}

/// Keyed, TTL-bounded storage that correlates results back to their callers.
#[async_trait]
pub trait ResultStore: Sync + Send {
    /// Publishes `result` under its task id. It expires unclaimed after `ttl`.
    async fn put(&self, result: TaskResult, ttl: Duration) -> Result<()>;

    /// Waits up to `timeout` for the result of `task_id` and removes it.
    ///
    /// Results for other ids are never consumed or reordered by this call.
    async fn take(&self, task_id: &TaskId, timeout: Duration) -> Result<Option<TaskResult>>;
}

/// A live lease together with the record its executor published.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseInfo {
    pub record: ExecutorRecord,
    pub remaining: Duration,
}

#[async_trait]
pub trait LeaseStore: Sync + Send {
    /// Refreshes the lease of `record.id` for another `ttl`.
    async fn renew(&self, record: &ExecutorRecord, ttl: Duration) -> Result<()>;

    /// Lease time left, or `None` once it has expired.
    async fn remaining(&self, id: &ExecutorId) -> Result<Option<Duration>>;

    /// Every lease that has not expired yet.
    async fn leases(&self) -> Result<Vec<LeaseInfo>>;
}

#[async_trait]
pub trait CacheStore: Sync + Send {
    async fn cache_get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>>;

    /// Stores `entry` for `entry.ttl`, replacing any previous entry.
    async fn cache_set(&self, entry: CacheEntry) -> Result<()>;

    /// Removes every entry and returns how many were removed.
    async fn cache_clear(&self) -> Result<usize>;

    async fn cache_len(&self) -> Result<usize>;
}

/// One backing store that provides every coordination primitive.
#[async_trait]
pub trait Storage: WorkQueue + ResultStore + LeaseStore + CacheStore {
    fn kind(&self) -> StorageType;

    /// Checks that the store is reachable.
    async fn ping(&self) -> Result<()>;
}

pub fn create_new_storage(config: &HvConfig) -> Result<Arc<dyn Storage>> {
    let storage_type = config.storage.name;
    log::info!("Storage type: {:?}", storage_type);

    match storage_type {
        StorageType::Memory => {
            let memory_config = config
                .storage
                .memory
                .as_ref()
                .ok_or_else(|| Error::from("memory storage config is not set"))?;

            Ok(Arc::new(MemoryStorage::new(memory_config)))
        }
        #[cfg(feature = "redis-store")]
        StorageType::Redis => {
            let redis_config = config
                .storage
                .redis
                .as_ref()
                .ok_or_else(|| Error::from("redis storage config is not set"))?;

            Ok(Arc::new(RedisStorage::new(redis_config)?))
        }
        #[allow(unreachable_patterns)]
        _ => Err("Unsupported storage type".into()),
    }
}

pub(crate) fn encode<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Error::codec)
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(Error::codec)
}

/// Longest wait any store honours, far enough out to mean "no deadline".
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + wait`, capped at [`FAR_FUTURE`] so caller-supplied waits cannot overflow.
pub(crate) fn deadline_after(now: tokio::time::Instant, wait: Duration) -> tokio::time::Instant {
    now + wait.min(FAR_FUTURE)
}

type Cause = Box<dyn StdError + Send + Sync>;

/// An error raised by a backing store.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

#[derive(Debug, PartialEq, Eq)]
enum Kind {
    /// The store could not be reached or refused the operation.
    Unavailable,
    /// A stored value could not be encoded or decoded.
    Codec,
    Custom(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        err.to_string().into()
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Self::new(Kind::Custom(err), None)
    }
}

impl Error {
    fn new(kind: Kind, cause: Option<Cause>) -> Self {
        Self {
            inner: Box::new(ErrorImpl { kind, cause }),
        }
    }

    pub(crate) fn unavailable<E: Into<Cause>>(cause: E) -> Self {
        Self::new(Kind::Unavailable, Some(cause.into()))
    }

    pub(crate) fn codec<E: Into<Cause>>(cause: E) -> Self {
        Self::new(Kind::Codec, Some(cause.into()))
    }

    /// Whether the store itself is unreachable, as opposed to holding bad data.
    pub fn is_unavailable(&self) -> bool {
        self.inner.kind == Kind::Unavailable
    }

    pub fn is_codec(&self) -> bool {
        self.inner.kind == Kind::Codec
    }

    /// The error's standalone message, without the message from the source.
    pub fn message(&self) -> impl fmt::Display + '_ {
        self.description()
    }

    fn description(&self) -> &str {
        match self.inner.kind {
            Kind::Unavailable => "storage unavailable",
            Kind::Codec => "malformed stored value",
            Kind::Custom(ref msg) => msg,
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("storage::Error");
        f.field(&self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            f.field(cause);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.cause {
            Some(ref cause) => write!(f, "{}: {}", self.description(), cause),
            None => f.write_str(self.description()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutorState, Outcome, SearchParams, Task};

    #[test]
    fn test_error_kinds() {
        let err = Error::unavailable("connection refused");
        assert!(err.is_unavailable());
        assert_eq!(err.to_string(), "storage unavailable: connection refused");
        assert!(err.source().is_some());

        let err = decode::<TaskResult>("{not json").unwrap_err();
        assert!(err.is_codec());
        assert!(!err.is_unavailable());

        let err = Error::from("boom");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.message().to_string(), "boom");
    }

    #[test]
    fn test_deadline_after_never_overflows() {
        let now = tokio::time::Instant::now();

        assert_eq!(deadline_after(now, Duration::from_secs(5)), now + Duration::from_secs(5));
        assert_eq!(deadline_after(now, Duration::MAX), now + FAR_FUTURE);
        assert_eq!(deadline_after(now, Duration::from_secs(u64::MAX)), now + FAR_FUTURE);
    }

    #[test]
    fn test_wire_round_trips() {
        let task = Task::new(SearchParams::new("pizza: the good kind", "Boston, MA", 7));
        let back: Task = decode(&encode(&task).unwrap()).unwrap();
        assert_eq!(back, task);

        let result = TaskResult::new(
            task.id.clone(),
            Some(ExecutorId::new("alpha", 3)),
            Duration::from_millis(1_250),
            Outcome::Success {
                payload: vec![serde_json::json!({"name": "a"}), serde_json::json!(null)],
            },
        );
        let back: TaskResult = decode(&encode(&result).unwrap()).unwrap();
        assert_eq!(back, result);

        let state = ExecutorState::new(ExecutorId::new("alpha", 3));
        let record = state.snapshot();
        let back: ExecutorRecord = decode(&encode(&record).unwrap()).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.node, "alpha");
    }

    #[tokio::test]
    async fn test_create_memory_storage() {
        let config = HvConfig::defaults().unwrap();
        let storage = create_new_storage(&config).unwrap();

        assert_eq!(storage.kind(), StorageType::Memory);
        assert!(storage.ping().await.is_ok());
    }
}
