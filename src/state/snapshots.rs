//! Per-executor state snapshots

use serde::{Deserialize, Serialize};

use crate::state::{PhaseState, RunPhase};
use crate::TaskFailure;

/// State of a [`SingleTaskExecutor`](crate::engine::SingleTaskExecutor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState<T> {
    /// Value of the last successful run; kept when a later run fails
    pub data: Option<T>,
    /// Failure of the last run, if it failed
    pub error: Option<TaskFailure>,
    /// Current run phase
    pub phase: RunPhase,
}

impl<T> TaskState<T> {
    /// Whether a run is in flight
    pub fn loading(&self) -> bool {
        self.phase.is_running()
    }
}

impl<T> Default for TaskState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            phase: RunPhase::Idle,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> PhaseState for TaskState<T> {
    fn phase(&self) -> RunPhase {
        self.phase
    }
}

/// State of a [`BatchExecutor`](crate::batch::BatchExecutor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchState<R> {
    /// Results of the last successful run, in input order
    pub data: Vec<R>,
    /// Failure that aborted the last run
    pub error: Option<TaskFailure>,
    /// Completed percentage of the current or last run, in [0, 100]
    pub progress: f64,
    /// Current run phase
    pub phase: RunPhase,
}

impl<R> BatchState<R> {
    /// Whether a run is in flight
    pub fn loading(&self) -> bool {
        self.phase.is_running()
    }
}

impl<R> Default for BatchState<R> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            error: None,
            progress: 0.0,
            phase: RunPhase::Idle,
        }
    }
}

impl<R: Clone + Send + Sync + 'static> PhaseState for BatchState<R> {
    fn phase(&self) -> RunPhase {
        self.phase
    }
}

/// State of a [`QueueExecutor`](crate::queue::QueueExecutor)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState<R> {
    /// Results accumulated across every successful drain
    pub data: Vec<R>,
    /// Failure that aborted the last drain
    pub error: Option<TaskFailure>,
    /// Items waiting in the queue
    pub pending: usize,
    /// Items processed successfully since construction or reset
    pub completed: usize,
    /// Current run phase
    pub phase: RunPhase,
}

impl<R> QueueState<R> {
    /// Whether a drain is in flight
    pub fn loading(&self) -> bool {
        self.phase.is_running()
    }
}

impl<R> Default for QueueState<R> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            error: None,
            pending: 0,
            completed: 0,
            phase: RunPhase::Idle,
        }
    }
}

impl<R: Clone + Send + Sync + 'static> PhaseState for QueueState<R> {
    fn phase(&self) -> RunPhase {
        self.phase
    }
}
