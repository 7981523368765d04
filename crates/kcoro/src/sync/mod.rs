//! Synchronization primitives for computations
//!
//! - [`WaitQueue`] / [`SingleWaitQueue`]: park computations until an event
//! - [`CoMutex`]: mutual exclusion that suspends instead of spinning

mod mutex;
mod wait_queue;

pub use mutex::{CoMutex, CoMutexGuard};
pub use wait_queue::{Done, SingleWaitQueue, Sleepable, TaskSleeper, WaitList, WaitQueue};
