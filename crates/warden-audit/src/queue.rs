//! Bounded queue between the decision path and the audit worker.
//!
//! Uses `crossbeam-queue::ArrayQueue` for a lock-free, bounded MPSC queue.
//! When the queue is full, `try_push` hands the event back so the producer
//! can route it elsewhere instead of blocking.

use crossbeam_queue::ArrayQueue;

/// Result of attempting to push onto the queue.
#[derive(Debug)]
pub enum PushResult<T> {
    /// Item was enqueued.
    Ok,
    /// Queue is full. Returns the item for the caller to handle.
    Full(T),
}

/// A bounded, lock-free queue that never blocks producers.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    inner: ArrayQueue<T>,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items. A zero capacity is
    /// raised to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: ArrayQueue::new(capacity.max(1)),
        }
    }

    pub fn try_push(&self, item: T) -> PushResult<T> {
        match self.inner.push(item) {
            Ok(()) => PushResult::Ok,
            Err(item) => PushResult::Full(item),
        }
    }

    /// Pops up to `max` items in FIFO order.
    pub fn pop_batch(&self, max: usize) -> Vec<T> {
        let mut batch = Vec::with_capacity(max.min(self.inner.len()));
        while batch.len() < max {
            match self.inner.pop() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}
