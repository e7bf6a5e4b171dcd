//! Queue Executor Implementation
//!
//! Drains a mutable FIFO work queue with:
//! - Rounds of up to `concurrency` items pulled from the front
//! - Items added mid-drain picked up by the same drain
//! - Either all-or-nothing failure or deferral of failed items to a later drain
//! - Cumulative results and `pending`/`completed` bookkeeping

use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, instrument, warn};

use crate::batch::ItemFailure;
use crate::config::QueueConfig;
use crate::engine::{boxed_item_operation, BoxedItemOperation, Callbacks};
use crate::notify::{Notification, NotificationEvent, NotificationSink, TracingSink};
use crate::queue::work_queue::WorkQueue;
use crate::state::{QueueState, RunPhase, RunTicket, StateCell};
use crate::telemetry::{ExecutorKind, ExecutorMetrics, Timer};
use crate::{Result, TaskError, TaskFailure};

/// Outcome of one drain round, in pull order
struct Round<I, R> {
    results: Vec<R>,
    failed: Vec<I>,
    fatal: Option<ItemFailure>,
}

/// Executor draining a mutable work queue under a concurrency limit
pub struct QueueExecutor<I, R> {
    operation: BoxedItemOperation<I, R>,
    config: QueueConfig,
    callbacks: Callbacks<[R]>,
    notifier: Arc<dyn NotificationSink>,
    queue: Arc<WorkQueue<I>>,
    state: Arc<StateCell<QueueState<R>>>,
    metrics: ExecutorMetrics,
}

impl<I, R> Clone for QueueExecutor<I, R> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            config: self.config.clone(),
            callbacks: self.callbacks.clone(),
            notifier: self.notifier.clone(),
            queue: self.queue.clone(),
            state: self.state.clone(),
            metrics: self.metrics,
        }
    }
}

impl<I, R> QueueExecutor<I, R>
where
    I: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Create an executor with an empty queue
    pub fn new<F, Fut, E>(operation: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        E: std::fmt::Display,
    {
        Self {
            operation: boxed_item_operation(operation),
            config: QueueConfig::default(),
            callbacks: Callbacks::default(),
            notifier: Arc::new(TracingSink),
            queue: Arc::new(WorkQueue::new()),
            state: Arc::new(StateCell::default()),
            metrics: ExecutorMetrics::new(ExecutorKind::Queue),
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = QueueConfig {
            concurrency: config.concurrency.max(1),
            retry_failed_items: config.retry_failed_items,
        };
        self
    }

    /// Set how many items each drain round pulls
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.config.concurrency = limit.max(1);
        self
    }

    /// Defer failed items to a later drain instead of aborting
    pub fn with_retry_failed_items(mut self, retry: bool) -> Self {
        self.config.retry_failed_items = retry;
        self
    }

    /// Call `callback` with the results of every successful drain
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[R]) + Send + Sync + 'static,
    {
        self.callbacks.set_on_success(Arc::new(callback));
        self
    }

    /// Call `callback` with the failure that aborted a drain
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TaskFailure) + Send + Sync + 'static,
    {
        self.callbacks.set_on_error(Arc::new(callback));
        self
    }

    /// Send abort and requeue notifications to `sink`
    pub fn with_notifier<N>(mut self, sink: N) -> Self
    where
        N: NotificationSink + 'static,
    {
        self.notifier = Arc::new(sink);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Current state snapshot
    pub fn state(&self) -> Arc<QueueState<R>> {
        self.state.snapshot()
    }

    /// Observe every state transition
    pub fn subscribe(&self) -> watch::Receiver<Arc<QueueState<R>>> {
        self.state.subscribe()
    }

    /// Observe state transitions as a stream
    pub fn subscribe_stream(&self) -> WatchStream<Arc<QueueState<R>>> {
        self.state.subscribe_stream()
    }

    /// Append one item to the back of the queue
    pub fn add(&self, item: I) {
        self.add_all(std::iter::once(item));
    }

    /// Append `items` to the back of the queue, in order
    pub fn add_all(&self, items: impl IntoIterator<Item = I>) {
        let items: Vec<I> = items.into_iter().collect();
        if items.is_empty() {
            return;
        }

        let count = items.len();
        let pending = self.queue.enqueue(items, |len| {
            self.state.modify(|state| state.pending = len);
        });
        self.metrics.adjust_pending(count as i64);
        debug!(count, pending, "Items enqueued");
    }

    /// Drain the queue; `None` if the drain aborted or a drain is in flight.
    pub async fn execute(&self) -> Option<Vec<R>> {
        self.try_execute().await.ok()
    }

    /// Drain the queue, returning this drain's results in pull order.
    ///
    /// An empty queue yields `Ok(vec![])` without touching state; a call made
    /// while another drain is in flight fails with
    /// [`TaskError::AlreadyRunning`] without touching state.
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn try_execute(&self) -> Result<Vec<R>> {
        let admitted = self.queue.inspect(|len| {
            if len == 0 {
                return Ok(None);
            }
            self.state
                .try_begin(|state| {
                    state.phase = RunPhase::Running;
                    state.error = None;
                })
                .map(Some)
        });

        let ticket = match admitted {
            Ok(Some(ticket)) => ticket,
            Ok(None) => {
                debug!("Queue is empty, nothing to drain");
                return Ok(Vec::new());
            }
            Err(e) => {
                debug!("Drain already in flight, ignoring execute()");
                self.metrics.record_rejected();
                return Err(e);
            }
        };
        tracing::Span::current().record("run_id", tracing::field::display(ticket.run_id()));

        let timer = Timer::start();
        self.metrics.record_run_start();
        info!(
            pending = self.state.snapshot().pending,
            concurrency = self.config.concurrency,
            retry_failed_items = self.config.retry_failed_items,
            "Starting queue drain"
        );

        let mut results = Vec::new();
        let mut deferred = Vec::new();

        loop {
            let pulled = self.queue.dequeue(self.config.concurrency, |remaining| {
                self.state.update(&ticket, |state| state.pending = remaining)
            });
            if pulled.is_empty() {
                break;
            }
            self.metrics.adjust_pending(-(pulled.len() as i64));
            debug!(items = pulled.len(), "Pulled drain round");

            let round = self.run_round(&ticket, pulled).await;
            if !self.state.is_current(&ticket) {
                return Err(self.orphaned(&timer));
            }

            if let Some(item_failure) = round.fatal {
                return self.abort(&ticket, item_failure, &timer).await;
            }
            results.extend(round.results);
            deferred.extend(round.failed);
        }

        if !self.state.is_current(&ticket) {
            return Err(self.orphaned(&timer));
        }

        if !deferred.is_empty() {
            let count = deferred.len();
            if !self.requeue(&ticket, deferred) {
                return Err(self.orphaned(&timer));
            }
            self.notifier
                .notify(Notification::new(NotificationEvent::ItemsRequeued { count }))
                .await;
        }

        self.succeed(&ticket, results, &timer)
    }

    /// Clear the queue and restore the empty state, orphaning any drain
    pub fn reset(&self) {
        let removed = self.queue.clear(|| self.state.reset(QueueState::default()));
        self.metrics.adjust_pending(-(removed as i64));
        debug!(removed, "Queue executor reset");
    }

    /// Push failed items back for the next drain; false if the drain was
    /// orphaned, in which case nothing is queued.
    fn requeue(&self, ticket: &RunTicket, deferred: Vec<I>) -> bool {
        let count = deferred.len();
        let queued = self.queue.enqueue_if(deferred, |len| {
            self.state.update(ticket, |state| state.pending = len)
        });
        if queued.is_none() {
            return false;
        }
        warn!(count, "Requeued failed items for the next drain");
        self.metrics.adjust_pending(count as i64);
        self.metrics.record_requeued(count);
        true
    }

    async fn run_round(&self, ticket: &RunTicket, pulled: Vec<I>) -> Round<I, R> {
        let mut in_flight: FuturesUnordered<_> = pulled
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, item)| {
                let pending = (self.operation)(item);
                async move { (index, pending.await) }
            })
            .collect();

        let mut slots: Vec<Option<std::result::Result<R, TaskFailure>>> =
            (0..pulled.len()).map(|_| None).collect();

        while let Some((index, outcome)) = in_flight.next().await {
            if outcome.is_ok() {
                self.state.update(ticket, |state| state.completed += 1);
                self.metrics.record_items("success", 1);
            } else {
                self.metrics.record_items("failure", 1);
            }
            slots[index] = Some(outcome);
        }

        let mut round = Round {
            results: Vec::new(),
            failed: Vec::new(),
            fatal: None,
        };
        for (index, (item, slot)) in pulled.into_iter().zip(slots).enumerate() {
            match slot {
                Some(Ok(result)) => round.results.push(result),
                Some(Err(failure)) if self.config.retry_failed_items => {
                    debug!(index, error = %failure, "Item failed, deferring");
                    round.failed.push(item);
                }
                Some(Err(failure)) => {
                    if round.fatal.is_none() {
                        round.fatal = Some(ItemFailure::new(index, failure));
                    }
                }
                None => {}
            }
        }
        round
    }

    fn succeed(&self, ticket: &RunTicket, results: Vec<R>, timer: &Timer) -> Result<Vec<R>> {
        let appended = results.clone();
        let published = self.state.update(ticket, move |state| {
            state.data.extend(appended);
            state.error = None;
            state.phase = RunPhase::Succeeded;
        });
        if !published {
            return Err(self.orphaned(timer));
        }

        let state = self.state.snapshot();
        info!(
            processed = results.len(),
            completed = state.completed,
            pending = state.pending,
            drain_duration_ms = (timer.elapsed_secs() * 1000.0) as u64,
            "Queue drain completed"
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
            round_index = item_failure.index,
            error = %failure,
            pending = self.state.snapshot().pending,
            "Queue drain aborted by item failure"
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
        debug!("Drain orphaned by reset, discarding its outcome");
        self.metrics.record_run_end("orphaned", timer.elapsed_secs());
        TaskError::Reset
    }
}
