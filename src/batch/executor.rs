//! Batch Executor Implementation
//!
//! Processes a fixed item list with:
//! - Fixed-size chunks taken in input order
//! - Waves of up to `concurrency` chunks, every item of a wave in flight at once
//! - Chunk-granular progress published to state and an optional callback
//! - All-or-nothing failure: the first failed item aborts the run

use std::future::Future;
use std::ops::Range;
use std::sync::Arc;

use futures::future::try_join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, instrument, warn};

use crate::batch::types::{chunk_ranges, progress_percent, ItemFailure, ProgressCallback};
use crate::config::BatchConfig;
use crate::engine::{boxed_item_operation, BoxedItemOperation, Callbacks};
use crate::notify::{Notification, NotificationEvent, NotificationSink, TracingSink};
use crate::state::{BatchState, RunPhase, RunTicket, StateCell};
use crate::telemetry::{ExecutorKind, ExecutorMetrics, Timer};
use crate::{Result, TaskError, TaskFailure};

/// Executor running a per-item operation over a fixed list
pub struct BatchExecutor<I, R> {
    operation: BoxedItemOperation<I, R>,
    items: Arc<[I]>,
    config: BatchConfig,
    callbacks: Callbacks<[R]>,
    progress_callback: Option<ProgressCallback>,
    notifier: Arc<dyn NotificationSink>,
    state: Arc<StateCell<BatchState<R>>>,
    metrics: ExecutorMetrics,
}

impl<I, R> Clone for BatchExecutor<I, R> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            items: self.items.clone(),
            config: self.config.clone(),
            callbacks: self.callbacks.clone(),
            progress_callback: self.progress_callback.clone(),
            notifier: self.notifier.clone(),
            state: self.state.clone(),
            metrics: self.metrics,
        }
    }
}

impl<I, R> BatchExecutor<I, R>
where
    I: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Create an executor applying `operation` to every item of `items`
    pub fn new<F, Fut, E>(operation: F, items: impl Into<Vec<I>>) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        E: std::fmt::Display,
    {
        let items: Vec<I> = items.into();
        Self {
            operation: boxed_item_operation(operation),
            items: items.into(),
            config: BatchConfig::default(),
            callbacks: Callbacks::default(),
            progress_callback: None,
            notifier: Arc::new(TracingSink),
            state: Arc::new(StateCell::default()),
            metrics: ExecutorMetrics::new(ExecutorKind::Batch),
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.config = BatchConfig {
            batch_size: config.batch_size.max(1),
            concurrency: config.concurrency.max(1),
        };
        self
    }

    /// Set the number of items per chunk
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size.max(1);
        self
    }

    /// Set the number of chunks per wave
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.config.concurrency = limit.max(1);
        self
    }

    /// Call `callback` with the completed percentage after every chunk
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Call `callback` with the full result list of every successful run
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[R]) + Send + Sync + 'static,
    {
        self.callbacks.set_on_success(Arc::new(callback));
        self
    }

    /// Call `callback` with the failure that aborted a run
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TaskFailure) + Send + Sync + 'static,
    {
        self.callbacks.set_on_error(Arc::new(callback));
        self
    }

    /// Send abort notifications to `sink`
    pub fn with_notifier<N>(mut self, sink: N) -> Self
    where
        N: NotificationSink + 'static,
    {
        self.notifier = Arc::new(sink);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Items this executor processes
    pub fn items(&self) -> &[I] {
        &self.items
    }

    /// Current state snapshot
    pub fn state(&self) -> Arc<BatchState<R>> {
        self.state.snapshot()
    }

    /// Observe every state transition
    pub fn subscribe(&self) -> watch::Receiver<Arc<BatchState<R>>> {
        self.state.subscribe()
    }

    /// Observe state transitions as a stream
    pub fn subscribe_stream(&self) -> WatchStream<Arc<BatchState<R>>> {
        self.state.subscribe_stream()
    }

    /// Process every item; `None` if any item failed or the call was rejected.
    pub async fn execute(&self) -> Option<Vec<R>> {
        self.try_execute().await.ok()
    }

    /// Process every item, reporting why no results were produced.
    #[instrument(skip(self), fields(item_count = self.items.len(), run_id = tracing::field::Empty))]
    pub async fn try_execute(&self) -> Result<Vec<R>> {
        if self.items.is_empty() {
            info!("No items to execute in batch");
            return Ok(Vec::new());
        }

        let ticket = match self.state.try_begin(|state| {
            state.phase = RunPhase::Running;
            state.error = None;
            state.progress = 0.0;
        }) {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!("Rejected execute() while a batch is in flight");
                self.metrics.record_rejected();
                return Err(e);
            }
        };
        tracing::Span::current().record("run_id", tracing::field::display(ticket.run_id()));

        let timer = Timer::start();
        self.metrics.record_run_start();

        let total = self.items.len();
        let chunks = chunk_ranges(total, self.config.batch_size);
        info!(
            total_items = total,
            chunks = chunks.len(),
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            "Starting batch execution"
        );

        let mut results = Vec::with_capacity(total);
        let mut completed = 0usize;

        for (wave_index, wave) in chunks.chunks(self.config.concurrency).enumerate() {
            debug!(wave = wave_index, chunks = wave.len(), "Starting wave");

            let mut in_flight: FuturesUnordered<_> = wave
                .iter()
                .cloned()
                .enumerate()
                .map(|(position, range)| self.run_chunk(position, range))
                .collect();
            let mut wave_results: Vec<Option<Vec<R>>> = (0..wave.len()).map(|_| None).collect();

            while let Some((position, outcome)) = in_flight.next().await {
                match outcome {
                    Ok(chunk_results) => {
                        completed += chunk_results.len();
                        self.metrics.record_items("success", chunk_results.len());

                        let progress = progress_percent(completed, total);
                        if !self.state.update(&ticket, |state| state.progress = progress) {
                            return Err(self.orphaned(&timer));
                        }
                        if let Some(callback) = &self.progress_callback {
                            callback(progress);
                        }
                        debug!(completed, total, progress, "Chunk completed");
                        wave_results[position] = Some(chunk_results);
                    }
                    Err(item_failure) => {
                        // Sibling chunks still in flight are dropped with `in_flight`.
                        return self.abort(&ticket, item_failure, &timer).await;
                    }
                }
            }

            results.extend(wave_results.into_iter().flatten().flatten());
        }

        self.succeed(&ticket, results, &timer)
    }

    /// Restore the empty state, orphaning any run in flight
    pub fn reset(&self) {
        self.state.reset(BatchState::default());
        debug!("Batch executor reset");
    }

    fn run_chunk(
        &self,
        position: usize,
        range: Range<usize>,
    ) -> impl Future<Output = (usize, std::result::Result<Vec<R>, ItemFailure>)> + Send + 'static
    {
        let calls: Vec<_> = range
            .map(|index| {
                let pending = (self.operation)(self.items[index].clone());
                async move {
                    pending
                        .await
                        .map_err(|failure| ItemFailure::new(index, failure))
                }
            })
            .collect();

        async move { (position, try_join_all(calls).await) }
    }

    fn succeed(&self, ticket: &RunTicket, results: Vec<R>, timer: &Timer) -> Result<Vec<R>> {
        let stored = results.clone();
        let published = self.state.update(ticket, move |state| {
            state.data = stored;
            state.error = None;
            state.progress = 100.0;
            state.phase = RunPhase::Succeeded;
        });
        if !published {
            return Err(self.orphaned(timer));
        }

        info!(
            total_items = results.len(),
            batch_duration_ms = (timer.elapsed_secs() * 1000.0) as u64,
            "Batch execution completed"
        );
        self.metrics.record_run_end("succeeded", timer.elapsed_secs());
        self.callbacks.success(&results);
        Ok(results)
    }

    async fn abort(
        &self,
        ticket: &RunTicket,
        item_failure: ItemFailure,
        timer: &Timer,
    ) -> Result<Vec<R>> {
        self.metrics.record_items("failure", 1);
        let failure = item_failure.failure;
        let stored = failure.clone();
        let published = self.state.update(ticket, move |state| {
            state.error = Some(stored);
            state.phase = RunPhase::Failed;
        });
        if !published {
            return Err(self.orphaned(timer));
        }

        error!(
            item_index = item_failure.index,
            error = %failure,
            progress = self.state.snapshot().progress,
            "Batch aborted by item failure"
        );
        self.metrics.record_run_end("failed", timer.elapsed_secs());
        self.callbacks.error(&failure);
        self.notifier
            .notify(Notification::new(NotificationEvent::RunAborted {
                error: failure.clone(),
            }))
            .await;
        Err(TaskError::Failed(failure))
    }

    fn orphaned(&self, timer: &Timer) -> TaskError {
        debug!("Batch orphaned by reset, discarding its outcome");
        self.metrics.record_run_end("orphaned", timer.elapsed_secs());
        TaskError::Reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubler(items: Vec<u32>) -> BatchExecutor<u32, u32> {
        BatchExecutor::new(|n: u32| async move { Ok::<_, String>(n * 2) }, items)
    }

    #[test]
    fn test_batch_executor_creation() {
        let executor = doubler(vec![1, 2, 3]);
        assert_eq!(executor.config(), &BatchConfig::default());
        assert_eq!(executor.items(), &[1, 2, 3]);
        assert_eq!(executor.state().progress, 0.0);
    }

    #[test]
    fn test_batch_executor_configuration() {
        let executor = doubler(vec![])
            .with_batch_size(0)
            .with_concurrency(0);
        assert_eq!(executor.config().batch_size, 1);
        assert_eq!(executor.config().concurrency, 1);

        let executor = doubler(vec![]).with_config(BatchConfig {
            batch_size: 4,
            concurrency: 2,
        });
        assert_eq!(executor.config().batch_size, 4);
        assert_eq!(executor.config().concurrency, 2);
    }

    #[tokio::test]
    async fn test_empty_items_leave_state_untouched() {
        let executor = doubler(vec![]);
        let before = executor.state();

        assert_eq!(executor.execute().await, Some(vec![]));
        assert_eq!(*executor.state(), *before);
    }

    #[tokio::test]
    async fn test_success_publishes_results() {
        let executor = doubler((1..=5).collect()).with_batch_size(2);

        assert_eq!(executor.execute().await, Some(vec![2, 4, 6, 8, 10]));

        let state = executor.state();
        assert_eq!(state.data, vec![2, 4, 6, 8, 10]);
        assert_eq!(state.progress, 100.0);
        assert_eq!(state.phase, RunPhase::Succeeded);
        assert!(!state.loading());
    }
}
