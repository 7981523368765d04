//! kcoro: cooperative task runtime for a multi-core kernel
//!
//! - **Tasks**: suspendable computations with symmetric transfer and failure propagation (`task` module)
//! - **Scheduler**: per-core FIFO run loop, executor wrapper and yield checkpoint (`scheduler` module)
//! - **Sync**: wait queues and a suspending mutex (`sync` module)
//! - **Runtime**: cores, their schedulers and their run-loop contexts (`runtime` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use kcoro::{Runtime, RuntimeConfig, Task};
//!
//! let runtime = Runtime::new(RuntimeConfig::single_core());
//! runtime.scheduler(0).schedule(Task::new(async {
//!     let answer = Task::new(async { Ok(42) }).await;
//!     assert_eq!(answer, Some(42));
//!     Ok(())
//! }));
//! runtime.tick(0);
//! runtime.shutdown();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod runtime;
pub mod scheduler;
pub mod sync;
pub mod task;

pub use config::RuntimeConfig;
pub use error::{TaskFailed, TaskResult, Violation};
pub use runtime::Runtime;
pub use scheduler::{yield_now, ReadyQueue, Scheduler, SchedulerStats};
pub use sync::{CoMutex, CoMutexGuard, SingleWaitQueue, WaitList, WaitQueue};
pub use task::{current, Generator, Status, Task, TaskId, TaskRef, Yielder};

pub use kcoro_hal as hal;
