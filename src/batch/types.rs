//! Batch helper types and chunking arithmetic

use std::ops::Range;
use std::sync::Arc;

use crate::TaskFailure;

/// Callback receiving the completed percentage after every chunk
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// A failure attributed to one item of a batch or queue run.
///
/// Used to decide whether to abort or requeue; callers only ever see the
/// wrapped [`TaskFailure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Position of the item in the input list or drain round
    pub index: usize,
    /// What went wrong
    pub failure: TaskFailure,
}

impl ItemFailure {
    /// Attribute `failure` to the item at `index`
    pub fn new(index: usize, failure: TaskFailure) -> Self {
        Self { index, failure }
    }
}

/// Split `total` items into consecutive index ranges of `batch_size`.
///
/// The last range may be shorter. A zero `batch_size` is treated as one.
pub fn chunk_ranges(total: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..total)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(total))
        .collect()
}

/// Completed percentage, exactly 100 once every item is done
pub fn progress_percent(completed: usize, total: usize) -> f64 {
    if total == 0 || completed >= total {
        return 100.0;
    }
    completed as f64 / total as f64 * 100.0
}
