use std::error::Error as StdError;
use std::fmt;

use crate::storage;

type Cause = Box<dyn StdError + Send + Sync>;

/// An error that stops an executor.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

#[derive(Debug, PartialEq, Eq)]
enum Kind {
    /// The collaborator session could not be opened.
    Startup,
    /// The backing store failed where it cannot be retried.
    Store,
    Custom(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    fn new(kind: Kind, cause: Option<Cause>) -> Self {
        Self {
            inner: Box::new(ErrorImpl { kind, cause }),
        }
    }

    pub(crate) fn startup<E: Into<Cause>>(cause: E) -> Self {
        Self::new(Kind::Startup, Some(cause.into()))
    }

    pub fn is_startup(&self) -> bool {
        self.inner.kind == Kind::Startup
    }

    pub fn is_store(&self) -> bool {
        self.inner.kind == Kind::Store
    }

    /// The error's standalone message, without the message from the source.
    pub fn message(&self) -> impl fmt::Display + '_ {
        self.description()
    }

    fn description(&self) -> &str {
        match self.inner.kind {
            Kind::Startup => "collaborator failed to start",
            Kind::Store => "storage error",
            Kind::Custom(ref msg) => msg,
        }
    }
}

impl From<storage::Error> for Error {
    fn from(err: storage::Error) -> Self {
        Self::new(Kind::Store, Some(Box::new(err)))
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Self::new(Kind::Custom(err.to_string()), None)
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Self::new(Kind::Custom(err), None)
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
        let mut f = f.debug_tuple("executor::Error");
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
