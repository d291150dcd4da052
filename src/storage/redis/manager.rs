use redis::{aio::Connection, Client, ErrorKind, FromRedisValue, RedisError};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use super::super::{Error, Result};

/// Hands out dedicated connections and keeps a few idle ones for reuse.
///
/// A connection is never shared while a command is in flight, so a blocking
/// pop on one executor cannot stall anybody else.
pub struct ConnectionPool {
    client: Client,
    idle: Mutex<Vec<Connection>>,
    max_idle: usize,
}

impl ConnectionPool {
    pub fn new(url: &str, max_idle: usize) -> Result<Self> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            idle: Mutex::new(Vec::new()),
            max_idle,
        })
    }

    pub async fn get(&self) -> Result<PooledConnection<'_>> {
        let idle = self
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();

        let conn = match idle {
            Some(conn) => conn,
            None => self.client.get_tokio_connection().await?,
        };

        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
            broken: false,
        })
    }

    fn put_back(&self, conn: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Connection>,
    broken: bool,
}

impl<'a> PooledConnection<'a> {
    /// Runs `cmd`. A connection whose command failed or was cancelled midway
    /// is discarded instead of returning to the pool.
    pub async fn run<T: FromRedisValue>(&mut self, cmd: &redis::Cmd) -> Result<T> {
        self.broken = true;
        let value = cmd.query_async(self.deref_mut()).await?;
        self.broken = false;
        Ok(value)
    }

    pub async fn run_pipe<T: FromRedisValue>(&mut self, pipe: &redis::Pipeline) -> Result<T> {
        self.broken = true;
        let value = pipe.query_async(self.deref_mut()).await?;
        self.broken = false;
        Ok(value)
    }

    /// Collects every key matching `pattern` with SCAN.
    pub async fn scan_keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.broken = true;
        let mut keys = Vec::new();
        {
            let mut cmd = redis::cmd("SCAN");
            cmd.cursor_arg(0)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(500);

            let mut iter = cmd.iter_async::<String>(self.deref_mut()).await?;

            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        self.broken = false;
        Ok(keys)
    }
}

impl<'a> Deref for PooledConnection<'a> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection is present until drop")
    }
}

impl<'a> DerefMut for PooledConnection<'a> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection is present until drop")
    }
}

impl<'a> Drop for PooledConnection<'a> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if !self.broken {
                self.pool.put_back(conn);
            }
        }
    }
}

impl From<RedisError> for Error {
    fn from(err: RedisError) -> Self {
        match err.kind() {
            ErrorKind::TypeError => Self::codec(err),
            _ => Self::unavailable(err),
        }
    }
}
