use log::warn;
use rand::Rng;
use std::time::Duration;
use tokio::time;

use super::collaborator::Collaborator;
use crate::models::{ExecutorState, Outcome, Task};

/// A random duration drawn uniformly from `min..=max`.
pub(crate) fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }

    let millis = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(millis)
}

/// How an executor retries a failing collaborator.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Wait before the attempt following attempt number `attempt`: a uniform
    /// draw from the backoff window, scaled by `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        jitter(self.backoff_min, self.backoff_max) * attempt
    }

    /// Drives `collaborator` until it succeeds or the attempts run out.
    ///
    /// Never fails: an exhausted task becomes an [`Outcome::Error`] carrying the
    /// last failure reason.
    pub(crate) async fn run<C: Collaborator>(
        &self,
        collaborator: &mut C,
        task: &Task,
        state: &ExecutorState,
    ) -> Outcome {
        let attempts = self.max_attempts.max(1);
        let mut last_failure = String::new();

        for attempt in 1..=attempts {
            let failure = match time::timeout(self.attempt_timeout, collaborator.execute(task)).await
            {
                Ok(Ok(payload)) => return Outcome::Success { payload },
                Ok(Err(failure)) => failure,
                Err(_) => format!("attempt timed out after {:?}", self.attempt_timeout).into(),
            };

            state.attempt_failed();
            warn!(
                "{} attempt {}/{} for {} failed: {}",
                state.id(),
                attempt,
                attempts,
                task.id,
                failure
            );

            last_failure = failure.reason().to_string();
            if failure.is_permanent() {
                break;
            }

            if attempt < attempts {
                time::sleep(self.backoff(attempt)).await;
            }
        }

        Outcome::Error {
            error: last_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::collaborator::Failure;
    use crate::models::{ExecutorId, Record, SearchParams};
    use async_trait::async_trait;
    use serde_json::json;

    /// Fails the first `failures` attempts, then succeeds.
    struct Flaky {
        failures: usize,
        calls: usize,
    }

    #[async_trait]
    impl Collaborator for Flaky {
        async fn execute(&mut self, _task: &Task) -> Result<Vec<Record>, Failure> {
            self.calls += 1;
            if self.calls <= self.failures {
                return Err(format!("blocked on attempt {}", self.calls).into());
            }
            Ok(vec![json!("ok")])
        }
    }

    struct Hangs;

    #[async_trait]
    impl Collaborator for Hangs {
        async fn execute(&mut self, _task: &Task) -> Result<Vec<Record>, Failure> {
            futures::future::pending().await
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_min: Duration::from_millis(1),
            backoff_max: Duration::from_millis(3),
            attempt_timeout: Duration::from_millis(50),
        }
    }

    fn task() -> Task {
        Task::new(SearchParams::new("pizza", "boston", 10))
    }

    #[test]
    fn test_jitter_stays_in_window() {
        let (min, max) = (Duration::from_millis(3_000), Duration::from_millis(6_000));
        for _ in 0..100 {
            let delay = jitter(min, max);
            assert!(delay >= min && delay <= max);
        }

        assert_eq!(jitter(max, min), max);
    }

    #[test]
    fn test_backoff_grows_with_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_min: Duration::from_millis(100),
            backoff_max: Duration::from_millis(200),
            attempt_timeout: Duration::from_secs(1),
        };

        let third = policy.backoff(3);
        assert!(third >= Duration::from_millis(300) && third <= Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_two_attempts_then_error() {
        let state = ExecutorState::new(ExecutorId::new("n", 0));
        let mut collaborator = Flaky {
            failures: 2,
            calls: 0,
        };

        let outcome = policy(2).run(&mut collaborator, &task(), &state).await;

        assert_eq!(collaborator.calls, 2);
        assert_eq!(state.failed_attempts(), 2);
        assert_eq!(
            outcome,
            Outcome::Error {
                error: "blocked on attempt 2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_recovers_within_budget() {
        let state = ExecutorState::new(ExecutorId::new("n", 0));
        let mut collaborator = Flaky {
            failures: 2,
            calls: 0,
        };

        let outcome = policy(3).run(&mut collaborator, &task(), &state).await;

        assert_eq!(collaborator.calls, 3);
        assert_eq!(state.failed_attempts(), 2);
        assert_eq!(outcome, Outcome::Success { payload: vec![json!("ok")] });
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let state = ExecutorState::new(ExecutorId::new("n", 0));
        let mut collaborator = Flaky {
            failures: 0,
            calls: 0,
        };

        let outcome = policy(0).run(&mut collaborator, &task(), &state).await;

        assert_eq!(collaborator.calls, 1);
        assert!(matches!(outcome, Outcome::Success { .. }));
    }

    #[tokio::test]
    async fn test_hung_attempt_counts_as_failure() {
        let state = ExecutorState::new(ExecutorId::new("n", 0));

        let outcome = policy(2).run(&mut Hangs, &task(), &state).await;

        assert_eq!(state.failed_attempts(), 2);
        match outcome {
            Outcome::Error { error } => assert!(error.starts_with("attempt timed out")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permanent_failure_skips_retries() {
        let state = ExecutorState::new(ExecutorId::new("n", 0));
        let mut collaborator = crate::executor::collaborator::Unconfigured;

        let outcome = policy(5).run(&mut collaborator, &task(), &state).await;

        assert_eq!(state.failed_attempts(), 1);
        assert_eq!(
            outcome,
            Outcome::Error {
                error: "no collaborator configured".to_string()
            }
        );
    }
}
