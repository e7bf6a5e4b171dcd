//! Single Task Executor
//!
//! Runs exactly one operation with:
//! - A fixed number of total attempts spaced by a fixed delay
//! - A per-attempt timeout race that detaches (or aborts) the loser
//! - Whole-snapshot state publication and a re-entrancy guard
//! - Retry and exhaustion notifications

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{TaskConfig, TimeoutBehavior};
use crate::engine::resilience::{run_timed_attempt, FixedDelay, RetryDecision};
use crate::engine::{boxed_operation, BoxedOperation, Callbacks};
use crate::notify::{Notification, NotificationEvent, NotificationSink, TracingSink};
use crate::state::{RunPhase, RunTicket, StateCell, TaskState};
use crate::telemetry::{ExecutorKind, ExecutorMetrics, Timer};
use crate::{Result, TaskError, TaskFailure};

/// Executor for one retried, time-bounded operation
pub struct SingleTaskExecutor<T> {
    operation: BoxedOperation<T>,
    config: TaskConfig,
    callbacks: Callbacks<T>,
    notifier: Arc<dyn NotificationSink>,
    state: Arc<StateCell<TaskState<T>>>,
    metrics: ExecutorMetrics,
}

impl<T> Clone for SingleTaskExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            config: self.config.clone(),
            callbacks: self.callbacks.clone(),
            notifier: self.notifier.clone(),
            state: self.state.clone(),
            metrics: self.metrics,
        }
    }
}

impl<T> SingleTaskExecutor<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an executor for `operation` with default settings
    pub fn new<F, Fut, E>(operation: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: std::fmt::Display,
    {
        Self {
            operation: boxed_operation(operation),
            config: TaskConfig::default(),
            callbacks: Callbacks::default(),
            notifier: Arc::new(TracingSink),
            state: Arc::new(StateCell::default()),
            metrics: ExecutorMetrics::new(ExecutorKind::Task),
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self.config.retry_count = self.config.retry_count.max(1);
        self.config.timeout_ms = self.config.timeout_ms.max(1);
        self
    }

    /// Set the total number of attempts (at least one)
    pub fn with_retry_count(mut self, attempts: u32) -> Self {
        self.config.retry_count = attempts.max(1);
        self
    }

    /// Set the fixed delay between attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the per-attempt timeout (at least one millisecond)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = (timeout.as_millis() as u64).max(1);
        self
    }

    /// Choose what happens to an attempt that times out
    pub fn with_timeout_behavior(mut self, behavior: TimeoutBehavior) -> Self {
        self.config.timeout_behavior = behavior;
        self
    }

    /// Call `callback` with the value of every successful run
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.callbacks.set_on_success(Arc::new(callback));
        self
    }

    /// Call `callback` with the failure of every exhausted run
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TaskFailure) + Send + Sync + 'static,
    {
        self.callbacks.set_on_error(Arc::new(callback));
        self
    }

    /// Send retry and exhaustion notifications to `sink`
    pub fn with_notifier<N>(mut self, sink: N) -> Self
    where
        N: NotificationSink + 'static,
    {
        self.notifier = Arc::new(sink);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Current state snapshot
    pub fn state(&self) -> Arc<TaskState<T>> {
        self.state.snapshot()
    }

    /// Observe every state transition
    pub fn subscribe(&self) -> watch::Receiver<Arc<TaskState<T>>> {
        self.state.subscribe()
    }

    /// Observe state transitions as a stream
    pub fn subscribe_stream(&self) -> WatchStream<Arc<TaskState<T>>> {
        self.state.subscribe_stream()
    }

    /// Run the operation; `None` if it failed, was rejected or was reset.
    pub async fn execute(&self) -> Option<T> {
        self.try_execute().await.ok()
    }

    /// Run the operation, reporting why it produced no value.
    ///
    /// Fails with [`TaskError::AlreadyRunning`] if a run is in flight,
    /// [`TaskError::Failed`] once every attempt failed, and
    /// [`TaskError::Reset`] if [`reset`](Self::reset) orphaned this run.
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn try_execute(&self) -> Result<T> {
        let ticket = match self.state.try_begin(|state| {
            state.phase = RunPhase::Running;
            state.error = None;
        }) {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!("Rejected execute() while a run is in flight");
                self.metrics.record_rejected();
                return Err(e);
            }
        };
        tracing::Span::current().record("run_id", tracing::field::display(ticket.run_id()));

        let timer = Timer::start();
        self.metrics.record_run_start();
        let policy = FixedDelay::new(self.config.retry_count, self.config.retry_delay());
        let timeout = self.config.timeout();

        info!(
            max_attempts = policy.max_attempts(),
            retry_delay_ms = self.config.retry_delay_ms,
            timeout_ms = self.config.timeout_ms,
            "Starting task"
        );

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(attempt, "Starting attempt");

            let outcome =
                run_timed_attempt(&self.operation, timeout, self.config.timeout_behavior).await;
            if !self.state.is_current(&ticket) {
                return Err(self.orphaned(&timer));
            }

            let failure = match outcome {
                Ok(value) => {
                    self.metrics.record_attempt("success");
                    return self.succeed(&ticket, value, attempt, &timer);
                }
                Err(failure) => failure,
            };

            self.metrics
                .record_attempt(if failure.is_timeout() { "timeout" } else { "failure" });

            match policy.decide(attempt) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Attempt failed, retrying"
                    );
                    self.metrics.record_retry();
                    self.notifier
                        .notify(Notification::new(NotificationEvent::RetryScheduled {
                            attempt,
                            max_attempts: policy.max_attempts(),
                            delay_ms: delay.as_millis() as u64,
                            error: failure,
                        }))
                        .await;

                    tokio::time::sleep(delay).await;
                    if !self.state.is_current(&ticket) {
                        return Err(self.orphaned(&timer));
                    }
                }
                RetryDecision::Exhausted => {
                    return self.exhaust(&ticket, failure, attempt, &timer).await;
                }
            }
        }
    }

    /// Restore the empty state, orphaning any run in flight
    pub fn reset(&self) {
        self.state.reset(TaskState::default());
        debug!("Task executor reset");
    }

    fn succeed(&self, ticket: &RunTicket, value: T, attempts: u32, timer: &Timer) -> Result<T> {
        let stored = value.clone();
        let published = self.state.update(ticket, move |state| {
            state.data = Some(stored);
            state.error = None;
            state.phase = RunPhase::Succeeded;
        });
        if !published {
            return Err(self.orphaned(timer));
        }

        info!(
            attempts,
            duration_ms = (timer.elapsed_secs() * 1000.0) as u64,
            "Task completed successfully"
        );
        self.metrics.record_run_end("succeeded", timer.elapsed_secs());
        self.callbacks.success(&value);
        Ok(value)
    }

    async fn exhaust(
        &self,
        ticket: &RunTicket,
        failure: TaskFailure,
        attempts: u32,
        timer: &Timer,
    ) -> Result<T> {
        let stored = failure.clone();
        let published = self.state.update(ticket, move |state| {
            state.error = Some(stored);
            state.phase = RunPhase::Failed;
        });
        if !published {
            return Err(self.orphaned(timer));
        }

        error!(attempts, error = %failure, "Task failed after all attempts");
        self.metrics.record_run_end("failed", timer.elapsed_secs());
        self.callbacks.error(&failure);
        self.notifier
            .notify(Notification::new(NotificationEvent::Exhausted {
                attempts,
                error: failure.clone(),
            }))
            .await;
        Err(TaskError::Failed(failure))
    }

    fn orphaned(&self, timer: &Timer) -> TaskError {
        debug!("Run orphaned by reset, discarding its outcome");
        self.metrics.record_run_end("orphaned", timer.elapsed_secs());
        TaskError::Reset
    }
}
