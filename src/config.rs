//! Executor configuration
//!
//! Durations are stored in milliseconds so configurations round-trip through
//! JSON unchanged. Every field has a default, so partial documents are valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, TaskError};

/// What happens to an operation that loses the race against its timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutBehavior {
    /// Leave the operation running and discard whatever it produces
    #[default]
    Detach,
    /// Abort the spawned operation
    Abort,
}

/// Configuration for [`SingleTaskExecutor`](crate::engine::SingleTaskExecutor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Total number of attempts, including the first one
    pub retry_count: u32,

    /// Fixed delay between attempts in milliseconds
    pub retry_delay_ms: u64,

    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,

    /// Fate of an attempt that timed out
    pub timeout_behavior: TimeoutBehavior,
}

impl TaskConfig {
    /// Delay between attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Per-attempt timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check that the configuration can drive at least one attempt
    pub fn validate(&self) -> Result<()> {
        if self.retry_count == 0 {
            return Err(TaskError::Config("retry_count must be at least 1".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(TaskError::Config("timeout_ms must be greater than 0".to_string()));
        }
        Ok(())
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_delay_ms: 1000,
            timeout_ms: 10_000,
            timeout_behavior: TimeoutBehavior::Detach,
        }
    }
}

/// Configuration for [`BatchExecutor`](crate::batch::BatchExecutor)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of items per chunk
    pub batch_size: usize,

    /// Number of chunks in flight per wave
    pub concurrency: usize,
}

impl BatchConfig {
    /// Check that chunks and waves are non-empty
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TaskError::Config("batch_size must be at least 1".to_string()));
        }
        if self.concurrency == 0 {
            return Err(TaskError::Config("concurrency must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            concurrency: 3,
        }
    }
}

/// Configuration for [`QueueExecutor`](crate::queue::QueueExecutor)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of items pulled and run together per drain round
    pub concurrency: usize,

    /// Push failed items to the back of the queue instead of aborting
    pub retry_failed_items: bool,
}

impl QueueConfig {
    /// Check that each drain round pulls at least one item
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(TaskError::Config("concurrency must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            retry_failed_items: false,
        }
    }
}

/// Settings for all three executors, typically loaded from one JSON document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Single-task settings
    pub task: TaskConfig,

    /// Batch settings
    pub batch: BatchConfig,

    /// Queue settings
    pub queue: QueueConfig,
}

impl ExecutorSettings {
    /// Parse and validate settings from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate settings from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.task.validate()?;
        self.batch.validate()?;
        self.queue.validate()
    }
}
