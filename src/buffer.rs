//! Unbounded FIFO buffer between producers and the batch loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::point::Payload;

/// Thread-safe FIFO holding raw outgoing points.
///
/// Producers are many and fast, the batch loop drains rarely: one mutex
/// guards the queue, and an atomic mirror of the length lets the batch
/// loop skip empty ticks without taking the lock.
pub struct PointBuffer {
    items: Mutex<VecDeque<Payload>>,
    len: AtomicUsize,
}

impl PointBuffer {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
        }
    }

    /// Appends one item at the tail.
    pub fn add(&self, item: Payload) {
        let mut items = match self.items.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        items.push_back(item);
        self.len.store(items.len(), Ordering::Release);
    }

    /// Atomically detaches the whole queue, resetting the size to zero.
    /// Items come back in insertion order.
    pub fn drain_all(&self) -> Vec<Payload> {
        let mut items = match self.items.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.len.store(0, Ordering::Release);
        std::mem::take(&mut *items).into()
    }

    /// Current number of buffered items.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops everything buffered; idempotent.
    pub fn release(&self) {
        let mut items = match self.items.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        items.clear();
        self.len.store(0, Ordering::Release);
    }
}

impl Default for PointBuffer {
    fn default() -> Self {
        Self::new()
    }
}
