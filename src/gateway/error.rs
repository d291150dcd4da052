use std::error::Error as StdError;
use std::fmt;

use crate::storage;

/// Why a dispatch produced no result at all.
///
/// A timeout is not an error: it comes back as an `Outcome::Timeout` reply.
#[derive(Debug)]
pub enum DispatchError {
    /// Missing or invalid parameters. Never retried.
    Validation(String),
    /// No executor holds a live lease, so the task was never enqueued.
    NoExecutorAvailable,
    /// The backing store failed after retries.
    StoreUnavailable(storage::Error),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Validation(reason) => f.write_str(reason),
            DispatchError::NoExecutorAvailable => f.write_str("no executors available"),
            DispatchError::StoreUnavailable(err) => write!(f, "store unavailable: {}", err),
        }
    }
}

impl StdError for DispatchError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            DispatchError::StoreUnavailable(err) => Some(err),
            _ => None,
        }
    }
}

impl From<storage::Error> for DispatchError {
    fn from(err: storage::Error) -> Self {
        DispatchError::StoreUnavailable(err)
    }
}
