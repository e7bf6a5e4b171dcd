//! Retry and timeout primitives
//!
//! Retries use a fixed delay with no backoff or jitter. Timeouts race the
//! operation, spawned as its own task, against a timer; the losing operation
//! is detached unless the caller asks for it to be aborted.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::TimeoutBehavior;
use crate::engine::BoxedOperation;
use crate::TaskFailure;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again
    RetryAfter(Duration),
    /// The attempt budget is spent
    Exhausted,
}

/// Fixed-delay retry policy counting total attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    max_attempts: u32,
    delay: Duration,
}

impl FixedDelay {
    /// Allow `max_attempts` attempts (at least one) spaced by `delay`
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Total attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide after attempt number `attempt` (starting at 1) failed
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::RetryAfter(self.delay)
        }
    }
}

/// Run one attempt of `operation`, failing with [`TaskFailure::Timeout`] if it
/// has not settled within `timeout`.
pub async fn run_timed_attempt<T>(
    operation: &BoxedOperation<T>,
    timeout: Duration,
    behavior: TimeoutBehavior,
) -> Result<T, TaskFailure>
where
    T: Send + 'static,
{
    let mut handle = tokio::spawn(operation());

    // A settled operation wins over a timer that fired on the same poll
    tokio::select! {
        biased;

        joined = &mut handle => match joined {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => {
                warn!(error = %join_error, "Operation panicked");
                Err(TaskFailure::operation(format!("operation panicked: {}", join_error)))
            }
            Err(join_error) => Err(TaskFailure::operation(join_error)),
        },
        _ = tokio::time::sleep(timeout) => {
            match behavior {
                TimeoutBehavior::Detach => {
                    debug!(timeout_ms = timeout.as_millis() as u64, "Attempt timed out, detaching operation");
                    drop(handle);
                }
                TimeoutBehavior::Abort => {
                    debug!(timeout_ms = timeout.as_millis() as u64, "Attempt timed out, aborting operation");
                    handle.abort();
                }
            }
            Err(TaskFailure::timeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::boxed_operation;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fixed_delay_counts_total_attempts() {
        let policy = FixedDelay::new(3, Duration::from_millis(50));

        assert_eq!(policy.decide(1), RetryDecision::RetryAfter(Duration::from_millis(50)));
        assert_eq!(policy.decide(2), RetryDecision::RetryAfter(Duration::from_millis(50)));
        assert_eq!(policy.decide(3), RetryDecision::Exhausted);
    }

    #[test]
    fn test_fixed_delay_clamps_zero_attempts() {
        let policy = FixedDelay::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.decide(1), RetryDecision::Exhausted);
    }

    #[tokio::test]
    async fn test_attempt_success() {
        let operation = boxed_operation(|| async { Ok::<_, String>("done") });
        let result = run_timed_attempt(&operation, Duration::from_secs(1), TimeoutBehavior::Detach).await;
        assert_eq!(result, Ok("done"));
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let operation = boxed_operation(|| std::future::pending::<Result<(), String>>());
        let result = run_timed_attempt(&operation, Duration::from_millis(20), TimeoutBehavior::Detach).await;
        assert_eq!(result, Err(TaskFailure::timeout(Duration::from_millis(20))));
    }

    #[tokio::test]
    async fn test_detached_operation_keeps_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let operation = boxed_operation(move || {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, String>(())
            }
        });

        let result = run_timed_attempt(&operation, Duration::from_millis(10), TimeoutBehavior::Detach).await;
        assert!(result.unwrap_err().is_timeout());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(finished.load(Ordering::SeqCst), "detached operation should run to completion");
    }

    #[tokio::test]
    async fn test_aborted_operation_stops() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let operation = boxed_operation(move || {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, String>(())
            }
        });

        let result = run_timed_attempt(&operation, Duration::from_millis(10), TimeoutBehavior::Abort).await;
        assert!(result.unwrap_err().is_timeout());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!finished.load(Ordering::SeqCst), "aborted operation should not complete");
    }

    #[tokio::test]
    async fn test_panicking_operation_becomes_failure() {
        let operation = boxed_operation(|| async {
            if true {
                panic!("kaboom");
            }
            Ok::<(), String>(())
        });

        let result = run_timed_attempt(&operation, Duration::from_secs(1), TimeoutBehavior::Detach).await;
        match result {
            Err(TaskFailure::Operation { message }) => assert!(message.contains("panicked")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
