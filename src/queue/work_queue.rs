//! Lock-guarded FIFO backing a queue executor

use std::collections::VecDeque;

use parking_lot::Mutex;

/// FIFO backlog owned by one queue executor.
///
/// Every mutation takes an `observe` callback that runs while the lock is
/// held, so observers see queue lengths in the order the mutations happened.
#[derive(Debug)]
pub struct WorkQueue<I> {
    items: Mutex<VecDeque<I>>,
}

impl<I> WorkQueue<I> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Run `f` with the current length while holding the lock
    pub fn inspect<T>(&self, f: impl FnOnce(usize) -> T) -> T {
        let items = self.items.lock();
        f(items.len())
    }

    /// Append `items` at the back; `observe` receives the new length
    pub fn enqueue(&self, items: impl IntoIterator<Item = I>, observe: impl FnOnce(usize)) -> usize {
        let mut queue = self.items.lock();
        queue.extend(items);
        observe(queue.len());
        queue.len()
    }

    /// Append `items` at the back only if `observe`, given the length the
    /// queue would have afterwards, returns true. Returns the new length.
    pub fn enqueue_if(&self, items: Vec<I>, observe: impl FnOnce(usize) -> bool) -> Option<usize> {
        let mut queue = self.items.lock();
        let len = queue.len() + items.len();
        if !observe(len) {
            return None;
        }
        queue.extend(items);
        Some(len)
    }

    /// Remove up to `max` items from the front.
    ///
    /// `observe` receives the length the queue would have afterwards; if it
    /// returns false nothing is removed.
    pub fn dequeue(&self, max: usize, observe: impl FnOnce(usize) -> bool) -> Vec<I> {
        let mut queue = self.items.lock();
        let take = max.min(queue.len());
        if take == 0 || !observe(queue.len() - take) {
            return Vec::new();
        }
        queue.drain(..take).collect()
    }

    /// Drop every item, returning how many were removed
    pub fn clear(&self, observe: impl FnOnce()) -> usize {
        let mut queue = self.items.lock();
        let removed = queue.len();
        queue.clear();
        observe();
        removed
    }
}

impl<I> Default for WorkQueue<I> {
    fn default() -> Self {
        Self::new()
    }
}
