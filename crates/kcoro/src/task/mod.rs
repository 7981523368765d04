//! Continuations
//!
//! A [`Task`] is one suspendable computation: an `async` body, the slot its
//! result lands in, and the links the runtime needs to move control between
//! computations without growing the native stack.
//!
//! - `frame`: per-continuation state (status, caller, scheduler binding, flags)
//! - `handle`: the owning [`Task`] handle and the non-owning [`TaskRef`] alias
//! - `join`: the futures behind `task.await` and `(&mut task).await`
//! - `trampoline`: symmetric transfer and failure propagation
//! - `generator`: multi-step production of values

mod frame;
mod generator;
mod handle;
mod join;
pub(crate) mod trampoline;

pub(crate) use frame::Continuation;
pub use generator::{Generator, YieldValue, Yielder};
pub use handle::{Task, TaskRef};
pub use join::{Join, Resume};

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a computation, unique for the life of the process
///
/// Never zero, so `Option<TaskId>` costs no more than the id itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(NonZeroU64);

impl TaskId {
    /// Allocate the next id; ids only grow
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let raw = COUNTER.fetch_add(1, Ordering::Relaxed);
        match NonZeroU64::new(raw) {
            Some(raw) => TaskId(raw),
            None => unreachable!("task id counter wrapped"),
        }
    }

    /// Rebuild an id from [`as_u64`](Self::as_u64); `None` for zero
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(TaskId)
    }

    pub fn as_u64(self) -> u64 {
        self.0.get()
    }
}

/// State of a continuation
///
/// A continuation parked at an await, a yield checkpoint or a wait queue is
/// still `Running`: it is in flight, it just is not on the processor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Created, never resumed
    Init = 0,
    /// Resumed and not settled yet
    Running = 1,
    /// Produced an intermediate value and waits to be resumed again
    Suspended = 2,
    /// Produced its final value
    Done = 3,
    /// Declared failure, or abandoned by failure propagation
    Failed = 4,
}

impl Status {
    /// `Done` or `Failed`
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done | Status::Failed)
    }

    /// Has handed a value (or a failure) to whoever resumed it
    pub fn is_settled(self) -> bool {
        matches!(self, Status::Suspended | Status::Done | Status::Failed)
    }

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Init => "init",
            Status::Running => "running",
            Status::Suspended => "suspended",
            Status::Done => "done",
            Status::Failed => "failed",
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Status::Init,
            1 => Status::Running,
            2 => Status::Suspended,
            3 => Status::Done,
            _ => Status::Failed,
        }
    }
}

/// The continuation currently on the processor, if any
pub fn current() -> Option<TaskRef> {
    trampoline::current().map(|frame| TaskRef::new(&frame))
}
