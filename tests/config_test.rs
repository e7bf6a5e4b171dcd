//! Configuration Tests
//!
//! Executors built from a shared JSON settings document, plus the metrics
//! they leave behind in the Prometheus registry.

use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use taskrunner::telemetry::{export_metrics, init_tracing};
use taskrunner::{
    BatchExecutor, ExecutorSettings, QueueExecutor, SingleTaskExecutor, TaskError, TimeoutBehavior,
};

const SETTINGS: &str = r#"{
    "task": { "retry_count": 2, "retry_delay_ms": 5, "timeout_ms": 50, "timeout_behavior": "abort" },
    "batch": { "batch_size": 4, "concurrency": 2 },
    "queue": { "concurrency": 2, "retry_failed_items": true }
}"#;

#[tokio::test]
async fn test_executors_from_settings() {
    init_tracing();
    let settings = ExecutorSettings::from_json_str(SETTINGS).unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let task = SingleTaskExecutor::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>("down") }
    })
    .with_config(settings.task.clone());

    assert_eq!(task.config().timeout_behavior, TimeoutBehavior::Abort);
    assert_eq!(task.execute().await, None);
    assert_eq!(calls.load(Ordering::SeqCst), 2, "retry_count bounds total attempts");

    let batch = BatchExecutor::new(|n: u32| async move { Ok::<_, String>(n * 3) }, vec![1, 2, 3, 4, 5])
        .with_config(settings.batch.clone());
    assert_eq!(batch.execute().await, Some(vec![3, 6, 9, 12, 15]));

    let queue = QueueExecutor::new(|n: u32| async move {
        if n % 2 == 0 {
            Err(format!("{} is even", n))
        } else {
            Ok(n)
        }
    })
    .with_config(settings.queue.clone());
    queue.add_all([1, 2, 3]);
    assert_eq!(queue.execute().await, Some(vec![1, 3]));
    assert_eq!(queue.state().pending, 1, "failed item was requeued");
}

#[tokio::test]
async fn test_settings_from_file() {
    let path = std::env::temp_dir().join(format!("taskrunner-settings-{}.json", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(SETTINGS.as_bytes()).unwrap();
    drop(file);

    let settings = ExecutorSettings::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(settings.task.timeout(), Duration::from_millis(50));
    assert_eq!(settings.batch.batch_size, 4);
    assert!(settings.queue.retry_failed_items);
}

#[test]
fn test_invalid_settings_rejected() {
    let result = ExecutorSettings::from_json_str(r#"{"batch": {"batch_size": 0}}"#);
    assert!(matches!(result, Err(TaskError::Config(_))));

    let result = ExecutorSettings::from_json_str("{ not json");
    assert!(matches!(result, Err(TaskError::Serialization(_))));
}

#[tokio::test]
async fn test_runs_show_up_in_metrics() {
    let executor = SingleTaskExecutor::new(|| async { Ok::<_, String>(1) });
    executor.execute().await;

    let exported = export_metrics().unwrap();
    assert!(exported.contains("taskrunner_runs_total"));
    assert!(exported.contains("taskrunner_attempts_total"));
}
