//! Per-core scheduling
//!
//! One [`Scheduler`] per core pulls computations off a FIFO [`ReadyQueue`]
//! and resumes them. Top-level computations are wrapped by an executor that
//! acts as their failure boundary, so one failing task never takes the core
//! down. [`yield_now`] lets a long computation give its turn away.

mod executor;
mod queue;
#[allow(clippy::module_inception)]
mod scheduler;
mod yield_now;

pub use queue::ReadyQueue;
pub use scheduler::{Scheduler, SchedulerStats};
pub use yield_now::{yield_now, YieldNow};
