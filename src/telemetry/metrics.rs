//! Metrics collection for executor runs
//!
//! Provides Prometheus-compatible metrics for monitoring run outcomes,
//! attempt counts, item throughput and queue depth.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    /// Counter for finished runs
    static ref RUNS: IntCounterVec = register_int_counter_vec!(
        "taskrunner_runs_total",
        "Total number of executor runs by outcome",
        &["executor", "status"]
    ).unwrap();

    /// Histogram for run duration
    static ref RUN_DURATION: HistogramVec = register_histogram_vec!(
        "taskrunner_run_duration_seconds",
        "Executor run duration in seconds",
        &["executor"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    ).unwrap();

    /// Gauge for runs in flight
    static ref ACTIVE_RUNS: IntGaugeVec = register_int_gauge_vec!(
        "taskrunner_active_runs",
        "Number of executor runs currently in flight",
        &["executor"]
    ).unwrap();

    /// Counter for single-task attempts
    static ref ATTEMPTS: IntCounterVec = register_int_counter_vec!(
        "taskrunner_attempts_total",
        "Total number of operation attempts by outcome",
        &["outcome"]
    ).unwrap();

    /// Counter for scheduled retries
    static ref RETRIES: IntCounter = register_int_counter!(
        "taskrunner_retries_total",
        "Total number of retries scheduled"
    ).unwrap();

    /// Counter for processed batch and queue items
    static ref ITEMS: IntCounterVec = register_int_counter_vec!(
        "taskrunner_items_total",
        "Total number of processed items by outcome",
        &["executor", "outcome"]
    ).unwrap();

    /// Counter for requeued items
    static ref ITEMS_REQUEUED: IntCounter = register_int_counter!(
        "taskrunner_items_requeued_total",
        "Total number of failed queue items pushed back for a later drain"
    ).unwrap();

    /// Gauge for queued items across all queue executors
    static ref QUEUE_PENDING: IntGauge = register_int_gauge!(
        "taskrunner_queue_pending",
        "Number of items waiting in queue executors"
    ).unwrap();
}

/// Which executor a metric belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    /// Single-operation executor
    Task,
    /// Fixed-list batch executor
    Batch,
    /// Work-queue executor
    Queue,
}

impl ExecutorKind {
    /// Label value
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Batch => "batch",
            Self::Queue => "queue",
        }
    }
}

/// Metrics recorder bound to one executor kind
#[derive(Debug, Clone, Copy)]
pub struct ExecutorMetrics {
    kind: ExecutorKind,
}

impl ExecutorMetrics {
    /// Create a recorder for `kind`
    pub fn new(kind: ExecutorKind) -> Self {
        Self { kind }
    }

    /// Record a run starting
    pub fn record_run_start(&self) {
        ACTIVE_RUNS.with_label_values(&[self.kind.as_str()]).inc();
    }

    /// Record a run finishing with `status` after `duration` seconds
    pub fn record_run_end(&self, status: &str, duration: f64) {
        ACTIVE_RUNS.with_label_values(&[self.kind.as_str()]).dec();
        RUNS.with_label_values(&[self.kind.as_str(), status]).inc();
        RUN_DURATION
            .with_label_values(&[self.kind.as_str()])
            .observe(duration);
    }

    /// Record a call rejected by the re-entrancy guard
    pub fn record_rejected(&self) {
        RUNS.with_label_values(&[self.kind.as_str(), "rejected"]).inc();
    }

    /// Record one attempt outcome (`success`, `failure` or `timeout`)
    pub fn record_attempt(&self, outcome: &str) {
        ATTEMPTS.with_label_values(&[outcome]).inc();
    }

    /// Record a scheduled retry
    pub fn record_retry(&self) {
        RETRIES.inc();
    }

    /// Record processed items
    pub fn record_items(&self, outcome: &str, count: usize) {
        ITEMS
            .with_label_values(&[self.kind.as_str(), outcome])
            .inc_by(count as u64);
    }

    /// Record requeued items
    pub fn record_requeued(&self, count: usize) {
        ITEMS_REQUEUED.inc_by(count as u64);
    }

    /// Adjust the pending queue gauge by `delta`
    pub fn adjust_pending(&self, delta: i64) {
        QUEUE_PENDING.add(delta);
    }
}

/// Timer for measuring run duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer
    #[inline]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in seconds
    #[inline]
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Export metrics in Prometheus format
pub fn export_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer)
        .map_err(|e| format!("Failed to convert metrics to UTF-8: {}", e).into())
}
