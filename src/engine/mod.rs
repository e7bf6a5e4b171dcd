//! Single-operation execution engine
//!
//! This module provides [`SingleTaskExecutor`] plus the operation and
//! callback types shared with the batch and queue executors.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{FutureExt, TryFutureExt};

use crate::TaskFailure;

pub mod executor;
pub mod resilience;

pub use executor::SingleTaskExecutor;
pub use resilience::{run_timed_attempt, FixedDelay, RetryDecision};

/// Type-erased operation with its error already normalized
pub type BoxedOperation<T> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<T, TaskFailure>> + Send + Sync>;

/// Type-erased per-item operation with its error already normalized
pub type BoxedItemOperation<I, R> =
    Arc<dyn Fn(I) -> BoxFuture<'static, Result<R, TaskFailure>> + Send + Sync>;

/// Called with the value of a successful run
pub type SuccessCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Called with the failure that ended a run
pub type ErrorCallback = Arc<dyn Fn(&TaskFailure) + Send + Sync>;

/// Erase an operation returning any displayable error
pub fn boxed_operation<F, Fut, T, E>(operation: F) -> BoxedOperation<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Display,
{
    Arc::new(move || {
        operation()
            .map_err(|e| TaskFailure::operation(e))
            .boxed()
    })
}

/// Erase a per-item operation returning any displayable error
pub fn boxed_item_operation<F, Fut, I, R, E>(operation: F) -> BoxedItemOperation<I, R>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    E: Display,
{
    Arc::new(move |item| {
        operation(item)
            .map_err(|e| TaskFailure::operation(e))
            .boxed()
    })
}

/// Optional success and error callbacks
pub struct Callbacks<T: ?Sized> {
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
}

impl<T: ?Sized> Callbacks<T> {
    /// Set the success callback
    pub fn set_on_success(&mut self, callback: SuccessCallback<T>) {
        self.on_success = Some(callback);
    }

    /// Set the error callback
    pub fn set_on_error(&mut self, callback: ErrorCallback) {
        self.on_error = Some(callback);
    }

    /// Invoke the success callback, if any
    pub fn success(&self, value: &T) {
        if let Some(callback) = &self.on_success {
            callback(value);
        }
    }

    /// Invoke the error callback, if any
    pub fn error(&self, failure: &TaskFailure) {
        if let Some(callback) = &self.on_error {
            callback(failure);
        }
    }
}

impl<T: ?Sized> Default for Callbacks<T> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
        }
    }
}

impl<T: ?Sized> Clone for Callbacks<T> {
    fn clone(&self) -> Self {
        Self {
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_boxed_operation_normalizes_error() {
        let operation = boxed_operation(|| async {
            Err::<u32, _>(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        });

        let result = operation().await;
        assert_eq!(result, Err(TaskFailure::operation("disk full")));
    }

    #[tokio::test]
    async fn test_boxed_item_operation_passes_item() {
        let operation = boxed_item_operation(|n: u32| async move { Ok::<_, String>(n * 2) });
        assert_eq!(operation(21).await, Ok(42));
    }

    #[test]
    fn test_callbacks_invoked() {
        let successes = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));

        let mut callbacks = Callbacks::<[u32]>::default();
        let counter = successes.clone();
        callbacks.set_on_success(Arc::new(move |values: &[u32]| {
            counter.fetch_add(values.len(), Ordering::SeqCst);
        }));
        let counter = errors.clone();
        callbacks.set_on_error(Arc::new(move |_: &TaskFailure| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        callbacks.success(&[1, 2, 3]);
        callbacks.error(&TaskFailure::operation("nope"));

        assert_eq!(successes.load(Ordering::SeqCst), 3);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }
}
