//! # taskrunner
//!
//! In-process asynchronous task executors with retry, timeout, bounded
//! concurrency, progress tracking and mutable work queues.
//!
//! ## Overview
//!
//! Three executors share one idea: run N async operations with at most C in
//! flight, retrying or bounding each one, and publish every state transition
//! as an immutable snapshot that a UI (or anything else) can observe.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use taskrunner::engine::SingleTaskExecutor;
//!
//! # async fn example() {
//! let executor = SingleTaskExecutor::new(|| async { Ok::<_, std::io::Error>(42) })
//!     .with_retry_count(3)
//!     .with_retry_delay(Duration::from_millis(250))
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(executor.execute().await, Some(42));
//! assert!(!executor.state().loading());
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: single-operation executor with retry and timeout
//! - [`batch`]: fixed item lists processed in chunked waves
//! - [`queue`]: mutable FIFO work queue drained under a concurrency limit
//! - [`state`]: snapshot cells and run phases shared by all executors
//! - [`notify`]: notification sink for retries and failures
//! - [`config`]: serde-backed executor configuration
//! - [`telemetry`]: tracing subscriber setup and Prometheus metrics

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for executor operations
pub type Result<T> = std::result::Result<T, TaskError>;

/// A failed attempt or item, normalized so it can be stored in state
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskFailure {
    /// The operation lost the race against its timer
    #[error("Operation timed out after {after_ms}ms")]
    Timeout {
        /// Configured timeout that elapsed
        after_ms: u64,
    },

    /// The operation itself failed
    #[error("{message}")]
    Operation {
        /// Rendered error message
        message: String,
    },
}

impl TaskFailure {
    /// Build a timeout failure for the given duration
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout {
            after_ms: after.as_millis() as u64,
        }
    }

    /// Normalize any displayable error into an operation failure
    pub fn operation(error: impl std::fmt::Display) -> Self {
        Self::Operation {
            message: error.to_string(),
        }
    }

    /// Whether this failure came from the timeout race
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Main error type for executor operations
#[derive(Error, Debug)]
pub enum TaskError {
    /// The run ended in a terminal failure
    #[error("Task failed: {0}")]
    Failed(#[from] TaskFailure),

    /// Another `execute()` on the same executor has not finished yet
    #[error("Executor is already running")]
    AlreadyRunning,

    /// The executor was reset while this run was in flight
    #[error("Executor was reset while the run was in flight")]
    Reset,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error while loading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serde-backed executor configuration
pub mod config;

/// Snapshot state shared by all executors
pub mod state;

/// Notification sink for retries and failures
pub mod notify;

/// Single-operation executor with retry and timeout
pub mod engine;

/// Fixed item lists processed in chunked waves
pub mod batch;

/// Mutable FIFO work queue
pub mod queue;

/// Tracing setup and Prometheus metrics
pub mod telemetry;

pub use batch::BatchExecutor;
pub use config::{BatchConfig, ExecutorSettings, QueueConfig, TaskConfig, TimeoutBehavior};
pub use engine::SingleTaskExecutor;
pub use notify::{Notification, NotificationEvent, NotificationSink};
pub use queue::QueueExecutor;
pub use state::{BatchState, QueueState, RunPhase, TaskState};
