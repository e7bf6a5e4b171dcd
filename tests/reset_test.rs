//! Reset Tests
//!
//! `reset()` restores the empty state at any time, is idempotent, and
//! orphans runs that were in flight when it was called.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use taskrunner::{
    BatchExecutor, BatchState, QueueExecutor, QueueState, RunPhase, SingleTaskExecutor, TaskError,
    TaskState,
};

#[tokio::test]
async fn test_task_reset_is_idempotent() {
    let executor = SingleTaskExecutor::new(|| async { Ok::<_, String>(9) });
    executor.execute().await;
    assert_eq!(executor.state().data, Some(9));

    executor.reset();
    let once = executor.state();
    executor.reset();
    let twice = executor.state();

    assert_eq!(*once, TaskState::default());
    assert_eq!(*once, *twice);
}

#[tokio::test]
async fn test_task_reset_mid_flight_orphans_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let executor = SingleTaskExecutor::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Err::<u32, _>("still failing")
        }
    })
    .with_retry_count(5)
    .with_retry_delay(Duration::from_millis(10));

    let running = executor.clone();
    let handle = tokio::spawn(async move { running.try_execute().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(executor.state().loading());

    executor.reset();
    assert_eq!(*executor.state(), TaskState::default());

    assert!(matches!(handle.await.unwrap(), Err(TaskError::Reset)));
    assert_eq!(*executor.state(), TaskState::default(), "orphaned run must not write state");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "orphaned run stops retrying");
}

#[tokio::test]
async fn test_task_executes_after_mid_flight_reset() {
    let executor = SingleTaskExecutor::new(|| async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok::<_, String>("fresh")
    });

    let running = executor.clone();
    let orphan = tokio::spawn(async move { running.try_execute().await });
    tokio::time::sleep(Duration::from_millis(5)).await;

    executor.reset();
    assert_eq!(executor.execute().await, Some("fresh"));
    assert!(matches!(orphan.await.unwrap(), Err(TaskError::Reset)));

    let state = executor.state();
    assert_eq!(state.data, Some("fresh"));
    assert_eq!(state.phase, RunPhase::Succeeded);
}

#[tokio::test]
async fn test_batch_reset() {
    let executor = BatchExecutor::new(
        |n: u32| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, String>(n)
        },
        (0..8).collect::<Vec<u32>>(),
    )
    .with_batch_size(2)
    .with_concurrency(1);

    executor.execute().await;
    executor.reset();
    executor.reset();
    assert_eq!(*executor.state(), BatchState::default());

    let running = executor.clone();
    let handle = tokio::spawn(async move { running.try_execute().await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(executor.state().progress > 0.0);

    executor.reset();
    assert_eq!(*executor.state(), BatchState::default());
    assert!(matches!(handle.await.unwrap(), Err(TaskError::Reset)));
    assert_eq!(*executor.state(), BatchState::default());
}

#[tokio::test]
async fn test_queue_reset_clears_queue() {
    let executor = QueueExecutor::new(|n: u32| async move { Ok::<_, String>(n) });
    executor.add_all([1, 2, 3]);
    executor.execute().await;
    executor.add_all([4, 5]);

    executor.reset();
    executor.reset();

    assert_eq!(*executor.state(), QueueState::default());
    assert_eq!(executor.execute().await, Some(vec![]), "queue was cleared");
}

#[tokio::test]
async fn test_queue_reset_mid_drain() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let executor = QueueExecutor::new(move |n: u32| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, String>(n * 10)
        }
    })
    .with_concurrency(1);
    executor.add_all([1, 2, 3, 4]);

    let running = executor.clone();
    let handle = tokio::spawn(async move { running.try_execute().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    executor.reset();
    assert_eq!(*executor.state(), QueueState::default());

    executor.add(7);
    assert!(matches!(handle.await.unwrap(), Err(TaskError::Reset)));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "orphaned drain stops pulling");

    let state = executor.state();
    assert_eq!(state.pending, 1);
    assert_eq!(state.completed, 0);
    assert!(!state.loading());

    assert_eq!(executor.execute().await, Some(vec![70]));
    assert_eq!(executor.state().data, vec![70]);
}
