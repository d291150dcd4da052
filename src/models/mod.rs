pub mod cache;
pub mod executor;
pub mod outcome;
pub mod task;

pub use cache::{CacheEntry, Fingerprint};
pub use executor::{ExecutorId, ExecutorRecord, ExecutorState};
pub use outcome::{Outcome, Record, Reply, TaskResult};
pub use task::{Envelope, SearchParams, Task, TaskId};
