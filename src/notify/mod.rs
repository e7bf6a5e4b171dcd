//! Notifications for retries and terminal failures
//!
//! Executors report what a human observer should know about through a
//! [`NotificationSink`]: a retry is scheduled, a run was exhausted or aborted,
//! failed items were deferred. The default sink writes to the log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::TaskFailure;

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NotificationEvent {
    /// An attempt failed and another one will start after `delay_ms`
    RetryScheduled {
        /// Attempt that just failed, starting at 1
        attempt: u32,
        /// Total attempts allowed
        max_attempts: u32,
        /// Delay before the next attempt
        delay_ms: u64,
        /// Failure of the attempt
        error: TaskFailure,
    },
    /// Every attempt failed
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Failure of the last attempt
        error: TaskFailure,
    },
    /// A batch or queue run was aborted by an item failure
    RunAborted {
        /// Failure that aborted the run
        error: TaskFailure,
    },
    /// Failed queue items were pushed back for a later drain
    ItemsRequeued {
        /// Number of items requeued
        count: usize,
    },
}

/// Event plus the moment it was raised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// When the event was raised
    pub at: DateTime<Utc>,
    /// The event itself
    pub event: NotificationEvent,
}

impl Notification {
    /// Stamp `event` with the current time
    pub fn new(event: NotificationEvent) -> Self {
        Self {
            at: Utc::now(),
            event,
        }
    }

    /// Whether the event reports a terminal failure rather than progress
    pub fn is_error(&self) -> bool {
        matches!(
            self.event,
            NotificationEvent::Exhausted { .. } | NotificationEvent::RunAborted { .. }
        )
    }

    /// Text suitable for showing to a person
    pub fn human_message(&self) -> String {
        match &self.event {
            NotificationEvent::RetryScheduled {
                attempt,
                max_attempts,
                delay_ms,
                error,
            } => {
                let remaining = max_attempts.saturating_sub(*attempt);
                format!(
                    "Attempt {attempt} of {max_attempts} failed ({error}). Retrying in {:.1}s, {remaining} attempt(s) left.",
                    *delay_ms as f64 / 1000.0
                )
            }
            NotificationEvent::Exhausted { attempts, error } => {
                format!("Operation failed after {attempts} attempt(s): {error}")
            }
            NotificationEvent::RunAborted { error } => format!("Processing stopped: {error}"),
            NotificationEvent::ItemsRequeued { count } => {
                format!("{count} failed item(s) will be retried on the next run")
            }
        }
    }
}

/// Receiver of executor notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification
    async fn notify(&self, notification: Notification);
}

/// Sink that writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, notification: Notification) {
        let message = notification.human_message();
        match &notification.event {
            NotificationEvent::RetryScheduled { attempt, max_attempts, .. } => {
                info!(attempt, max_attempts, "{}", message);
            }
            NotificationEvent::ItemsRequeued { count } => {
                warn!(count, "{}", message);
            }
            NotificationEvent::Exhausted { .. } | NotificationEvent::RunAborted { .. } => {
                error!("{}", message);
            }
        }
    }
}

/// Sink that forwards notifications over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    /// Create a sink and the receiver that observes it
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn notify(&self, notification: Notification) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.sender.send(notification);
    }
}
