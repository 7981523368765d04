//! Ready queue

use crate::task::TaskRef;
use kcoro_hal::SpinLock;
use std::collections::VecDeque;

/// FIFO of computations ready to resume
pub struct ReadyQueue {
    entries: SpinLock<VecDeque<TaskRef>>,
}

impl ReadyQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty queue with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: SpinLock::new("ready_queue", VecDeque::with_capacity(capacity)),
        }
    }

    /// Append at the back
    pub fn push(&self, task: TaskRef) {
        self.entries.lock().push_back(task);
    }

    /// Take from the front
    pub fn pop(&self) -> Option<TaskRef> {
        self.entries.lock().pop_front()
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Nothing is queued
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
