//! State management for executor runs
//!
//! Every executor owns a [`StateCell`] holding its current snapshot. Writers
//! build a new snapshot and swap it in whole, so readers always observe a
//! consistent state. A generation counter bumped by `reset()` orphans any run
//! started before the reset: its later writes are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;
use uuid::Uuid;

use crate::{Result, TaskError};

pub mod snapshots;

pub use snapshots::{BatchState, QueueState, TaskState};

/// Lifecycle of a single `execute()` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Nothing has run since construction or the last reset
    #[default]
    Idle,
    /// A run is in flight
    Running,
    /// The last run completed successfully
    Succeeded,
    /// The last run ended in a terminal failure
    Failed,
}

impl RunPhase {
    /// Whether a run is in flight
    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

/// Snapshots that carry a run phase
pub trait PhaseState: Clone + Send + Sync + 'static {
    /// Current phase
    fn phase(&self) -> RunPhase;
}

/// Proof that a run was admitted, tied to the generation it started in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTicket {
    generation: u64,
    run_id: Uuid,
}

impl RunTicket {
    /// Identifier used in logs and spans
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

/// Atomically swapped snapshot with change notification
pub struct StateCell<S> {
    current: ArcSwap<S>,
    generation: AtomicU64,
    writer: Mutex<()>,
    sender: watch::Sender<Arc<S>>,
}

impl<S: PhaseState> StateCell<S> {
    /// Create a cell holding `initial`
    pub fn new(initial: S) -> Self {
        let initial = Arc::new(initial);
        let (sender, _) = watch::channel(initial.clone());
        Self {
            current: ArcSwap::new(initial),
            generation: AtomicU64::new(0),
            writer: Mutex::new(()),
            sender,
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<S> {
        self.current.load_full()
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<S>> {
        self.sender.subscribe()
    }

    /// Stream of snapshots, starting with the current one
    pub fn subscribe_stream(&self) -> WatchStream<Arc<S>> {
        WatchStream::new(self.subscribe())
    }

    /// Admit a new run unless one is already in flight.
    ///
    /// `start` derives the running snapshot from the current one.
    pub fn try_begin(&self, start: impl FnOnce(&mut S)) -> Result<RunTicket> {
        let _guard = self.writer.lock();
        let current = self.current.load_full();
        if current.phase().is_running() {
            return Err(TaskError::AlreadyRunning);
        }

        let mut next = S::clone(&current);
        start(&mut next);
        self.publish(next);

        let ticket = RunTicket {
            generation: self.generation.load(Ordering::SeqCst),
            run_id: Uuid::new_v4(),
        };
        debug!(run_id = %ticket.run_id, "Run admitted");
        Ok(ticket)
    }

    /// Apply `change` if `ticket` still belongs to the current generation.
    ///
    /// Returns false when the run was orphaned by a reset.
    pub fn update(&self, ticket: &RunTicket, change: impl FnOnce(&mut S)) -> bool {
        let _guard = self.writer.lock();
        if !self.is_current(ticket) {
            return false;
        }
        let mut next = S::clone(&self.current.load());
        change(&mut next);
        self.publish(next);
        true
    }

    /// Apply `change` regardless of any run in flight
    pub fn modify(&self, change: impl FnOnce(&mut S)) {
        let _guard = self.writer.lock();
        let mut next = S::clone(&self.current.load());
        change(&mut next);
        self.publish(next);
    }

    /// Replace the snapshot with `initial` and orphan every admitted run
    pub fn reset(&self, initial: S) {
        let _guard = self.writer.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.publish(initial);
    }

    /// Whether `ticket` was issued in the current generation
    pub fn is_current(&self, ticket: &RunTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }

    fn publish(&self, next: S) {
        let next = Arc::new(next);
        self.current.store(next.clone());
        self.sender.send_replace(next);
    }
}

impl<S: PhaseState + Default> Default for StateCell<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}
