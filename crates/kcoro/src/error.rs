//! Failures and protocol violations
//!
//! A computation that cannot produce its value returns `Err(TaskFailed)`;
//! that is recoverable and propagates to the nearest handler. Everything in
//! [`Violation`] means an invariant of the runtime is already broken and
//! aborts the kernel.

use crate::task::TaskId;

/// Declared failure of a computation
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, thiserror::Error)]
#[error("task failed")]
pub struct TaskFailed;

/// What a computation body returns
pub type TaskResult<T = ()> = Result<T, TaskFailed>;

/// Broken runtime invariants
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    /// A reference outlived the continuation it points to and was resumed
    #[error("resumed destroyed continuation {0:?}")]
    ResumeDestroyed(TaskId),

    /// A continuation was destroyed in the middle of its computation
    #[error("continuation {id:?} destroyed while {status}")]
    DestroyedLive {
        /// Destroyed continuation
        id: TaskId,
        /// Status at destruction
        status: &'static str,
    },

    /// A failure walked the whole caller chain without meeting a handler
    #[error("continuation {0:?} failed with no error handler in its caller chain")]
    UnhandledFailure(TaskId),

    /// A continuation was awaited while it was already in flight
    #[error("continuation {0:?} awaited while already running")]
    AlreadyRunning(TaskId),

    /// An operation that needs the current continuation ran outside of one
    #[error("{0} used outside of a continuation")]
    NoContinuation(&'static str),

    /// A continuation was woken but was never bound to a scheduler
    #[error("continuation {0:?} woken without a scheduler")]
    Unbound(TaskId),

    /// A generator's yielder was used by some other continuation
    #[error("yield from continuation {actual:?} into generator {generator:?}")]
    ForeignYield {
        /// The generator that owns the yielder
        generator: TaskId,
        /// The continuation that tried to yield
        actual: Option<TaskId>,
    },

    /// A second sleeper on a single-slot wait queue
    #[error("single-slot wait queue `{0}` already has a sleeper")]
    SlotOccupied(&'static str),
}

/// Abort the kernel on a broken invariant
#[cold]
#[track_caller]
pub fn fatal(violation: Violation) -> ! {
    kcoro_hal::abort(violation)
}
