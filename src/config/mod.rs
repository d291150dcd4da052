use config::{Config, ConfigError, Environment, File, FileFormat};
use hv_utils::serde::{
    deserialize_millis_to_duration, deserialize_option_string, deserialize_secs_to_duration,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Built-in defaults, so the binary starts without a `conf/` directory.
const DEFAULT_CONFIG: &str = include_str!("../../conf/default.toml");

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Storage implemented using in-process data structures.
    Memory,
    /// Storage backed by the Redis key-value store.
    Redis,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Gateway and executor pool in one process.
    Standalone,
    /// HTTP gateway only.
    Gateway,
    /// Executor pool only.
    Executor,
}

impl Role {
    pub fn runs_gateway(&self) -> bool {
        matches!(self, Role::Standalone | Role::Gateway)
    }

    pub fn runs_executors(&self) -> bool {
        matches!(self, Role::Standalone | Role::Executor)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MemoryStorageConfig {
    /// Maximum number of queued tasks before enqueue is refused.
    pub queue_capacity: usize,
    /// Maximum number of cached results.
    pub cache_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedisStorageConfig {
    pub url: String,
    pub max_idle_connections: usize,

    #[serde(
        rename = "result_poll_interval_ms",
        deserialize_with = "deserialize_millis_to_duration"
    )]
    pub result_poll_interval: Duration,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub name: StorageType,
    pub redis: Option<RedisStorageConfig>,
    pub memory: Option<MemoryStorageConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub http: HttpServerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
/// Configuration options for an HTTP server.
pub struct HttpServerConfig {
    /// The port number on which the HTTP server will listen for incoming requests.
    pub port: u16,

    /// The host address of the HTTP server.
    pub host: String,

    /// Determines whether to log incoming requests.
    pub log_request: bool,

    /// Determines whether to enable HTTP keep-alive connections.
    pub enable_keep_alive: bool,

    #[serde(
        rename = "header_read_timeout_secs",
        deserialize_with = "deserialize_secs_to_duration"
    )]
    /// Time allowed for a client to finish sending request headers.
    pub header_read_timeout: Duration,

    /// The size of the connection backlog for incoming requests.
    pub connection_backlog_size: usize,

    /// The maximum number of connections served at once.
    pub max_concurrent_connections: usize,
}

/// Configuration options for the request gateway.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GatewayConfig {
    /// How long a dispatch waits for its result before reporting a timeout.
    #[serde(
        rename = "dispatch_timeout_secs",
        deserialize_with = "deserialize_secs_to_duration"
    )]
    pub dispatch_timeout: Duration,

    /// Upper bound for the per-request `timeout` a caller may ask for.
    #[serde(rename = "max_timeout_secs", deserialize_with = "deserialize_secs_to_duration")]
    pub max_timeout: Duration,

    /// Limit used when the caller does not send one.
    pub default_limit: u32,

    /// Upper bound for the requested limit.
    pub max_limit: u32,

    /// How long a published result waits for its caller.
    #[serde(
        rename = "result_ttl_secs",
        deserialize_with = "deserialize_secs_to_duration"
    )]
    pub result_ttl: Duration,

    /// How long a successful result stays cached.
    #[serde(rename = "cache_ttl_secs", deserialize_with = "deserialize_secs_to_duration")]
    pub cache_ttl: Duration,

    pub enqueue_retries: u32,

    #[serde(
        rename = "store_backoff_ms",
        deserialize_with = "deserialize_millis_to_duration"
    )]
    pub store_backoff: Duration,

    #[serde(
        rename = "stats_report_interval_secs",
        deserialize_with = "deserialize_secs_to_duration"
    )]
    pub stats_report_interval: Duration,
}

/// Configuration options for the executor pool.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExecutorConfig {
    #[serde(deserialize_with = "deserialize_option_string")]
    pub node: Option<String>,

    /// Number of executors started by this process.
    pub count: usize,

    /// Total collaborator attempts per task.
    pub max_retries: u32,

    #[serde(rename = "backoff_min_ms", deserialize_with = "deserialize_millis_to_duration")]
    pub backoff_min: Duration,

    #[serde(rename = "backoff_max_ms", deserialize_with = "deserialize_millis_to_duration")]
    pub backoff_max: Duration,

    #[serde(
        rename = "task_delay_min_ms",
        deserialize_with = "deserialize_millis_to_duration"
    )]
    pub task_delay_min: Duration,

    #[serde(
        rename = "task_delay_max_ms",
        deserialize_with = "deserialize_millis_to_duration"
    )]
    pub task_delay_max: Duration,

    #[serde(
        rename = "attempt_timeout_secs",
        deserialize_with = "deserialize_secs_to_duration"
    )]
    pub attempt_timeout: Duration,

    #[serde(
        rename = "poll_interval_ms",
        deserialize_with = "deserialize_millis_to_duration"
    )]
    pub poll_interval: Duration,

    #[serde(
        rename = "heartbeat_interval_secs",
        deserialize_with = "deserialize_secs_to_duration"
    )]
    pub heartbeat_interval: Duration,

    #[serde(rename = "lease_ttl_secs", deserialize_with = "deserialize_secs_to_duration")]
    pub lease_ttl: Duration,

    pub startup_retries: u32,

    #[serde(
        rename = "startup_backoff_ms",
        deserialize_with = "deserialize_millis_to_duration"
    )]
    pub startup_backoff: Duration,

    pub publish_retries: u32,

    #[serde(
        rename = "store_backoff_ms",
        deserialize_with = "deserialize_millis_to_duration"
    )]
    pub store_backoff: Duration,

    #[serde(rename = "stop_grace_secs", deserialize_with = "deserialize_secs_to_duration")]
    pub stop_grace: Duration,

    /// Shell command that performs the lookup for one attempt.
    #[serde(deserialize_with = "deserialize_option_string")]
    pub command: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
/// Configuration options for a harvester process.
pub struct HvConfig {
    /// Which components this process runs.
    pub role: Role,
    /// Configuration options for the server component.
    pub server: ServerConfig,
    /// Configuration options for the storage component.
    pub storage: StorageConfig,
    /// Configuration options for the request gateway.
    pub gateway: GatewayConfig,
    /// Configuration options for the executor pool.
    pub executor: ExecutorConfig,
    /// The log level to control the verbosity of log messages.
    pub log_level: String,
}

impl HvConfig {
    /// Attempt to load the configuration from the environment.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Built-in defaults
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            // Add in the current environment file
            // Default to 'development' env
            .add_source(File::with_name(&format!("conf/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(File::with_name("conf/local").required(false))
            // Add in settings from the environment (with a prefix of HV)
            // Eg.. `HV_GATEWAY__MAX_LIMIT=20 ./target/app` would set `gateway.max_limit`
            .add_source(
                Environment::with_prefix("hv")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// The built-in defaults alone, ignoring files and the environment.
    pub fn defaults() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn http_port(&self) -> u16 {
        self.server.http.port
    }

    pub fn http_host(&self) -> &str {
        self.server.http.host.as_ref()
    }

    pub fn http_log_request(&self) -> bool {
        self.server.http.log_request
    }

    pub fn is_keep_alive_enabled(&self) -> bool {
        self.server.http.enable_keep_alive
    }

    pub fn header_read_timeout(&self) -> Duration {
        self.server.http.header_read_timeout
    }

    pub fn connection_backlog_size(&self) -> i32 {
        self.server.http.connection_backlog_size as i32
    }

    pub fn max_concurrent_connections(&self) -> usize {
        self.server.http.max_concurrent_connections
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_ref()
    }

    /// Node name used in executor ids: configured value, then `$HOSTNAME`, then `node`.
    pub fn node_name(&self) -> String {
        self.executor
            .node
            .clone()
            .or_else(|| {
                std::env::var("HOSTNAME")
                    .ok()
                    .map(|host| host.trim().to_string())
                    .filter(|host| !host.is_empty())
            })
            .unwrap_or_else(|| "node".to_string())
    }
}
