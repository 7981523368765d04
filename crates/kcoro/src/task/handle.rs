//! Task handles

use super::frame::{Continuation, Frame};
use super::join::{Join, Resume};
use crate::error::{fatal, TaskResult, Violation};
use crate::task::{Status, TaskId};
use std::fmt;
use std::future::{Future, IntoFuture};
use std::sync::{Arc, Weak};

pub(crate) enum Slot<T> {
    Empty,
    AllocFailed,
    Live(Arc<Frame<T>>),
}

/// Exclusive handle to a computation producing `T`
///
/// Dropping the handle destroys the computation. That is fatal while the
/// computation is in flight, so a handle must be kept until the task settles
/// or handed to a scheduler, which owns it from then on.
///
/// A handle is one of three things: live, empty (the default), or the
/// allocation-failed sentinel made by [`Task::failed`]. Awaiting either of
/// the last two produces `None` straight away.
pub struct Task<T> {
    slot: Slot<T>,
}

impl<T: Send + 'static> Task<T> {
    /// Create a computation from its body. Nothing runs until it is awaited or scheduled.
    pub fn new<F>(body: F) -> Self
    where
        F: Future<Output = TaskResult<T>> + Send + 'static,
    {
        Self::from_frame(Arc::new(Frame::new(Box::pin(body))))
    }

    pub(crate) fn from_frame(frame: Arc<Frame<T>>) -> Self {
        log::trace!("task {:?}: created", frame.header().id());
        Self {
            slot: Slot::Live(frame),
        }
    }

    /// A handle to a computation
    pub fn get_ref(&self) -> Option<TaskRef> {
        self.frame().map(|frame| {
            let erased: Arc<dyn Continuation> = frame.clone();
            TaskRef::new(&erased)
        })
    }
}

impl<T> Task<T> {
    /// The sentinel for a computation whose frame could not be created
    pub fn failed() -> Self {
        log::error!("alloc task failed");
        Self {
            slot: Slot::AllocFailed,
        }
    }

    /// A handle that refers to nothing
    pub fn empty() -> Self {
        Self { slot: Slot::Empty }
    }

    /// Refers to nothing
    pub fn is_empty(&self) -> bool {
        matches!(self.slot, Slot::Empty)
    }

    /// Is the allocation-failed sentinel
    pub fn is_alloc_failed(&self) -> bool {
        matches!(self.slot, Slot::AllocFailed)
    }

    /// Identifier, for live handles
    pub fn id(&self) -> Option<TaskId> {
        self.frame().map(|frame| frame.header().id())
    }

    /// Status, for live handles
    pub fn status(&self) -> Option<Status> {
        self.frame().map(|frame| frame.header().status())
    }

    /// Control whether checkpoints and waits inside this computation suspend
    ///
    /// An awaited child takes its awaiter's setting unless it was given its own.
    pub fn set_no_yield(&self, no_yield: bool) {
        if let Some(frame) = self.frame() {
            frame.header().set_no_yield(no_yield);
        }
    }

    /// `true` when checkpoints and waits inside this computation continue at once
    pub fn no_yield(&self) -> bool {
        self.frame().map_or(false, |frame| frame.header().no_yield())
    }

    /// Mark this computation as a failure boundary: a failure reaching it is
    /// delivered to its caller as an absent result
    pub fn set_error_handler(&self, enabled: bool) {
        if let Some(frame) = self.frame() {
            frame.header().set_error_handler(enabled);
        }
    }

    /// Is a failure boundary
    pub fn has_error_handler(&self) -> bool {
        self.frame()
            .map_or(false, |frame| frame.header().has_error_handler())
    }

    /// Currently awaited by some other computation
    pub fn has_caller(&self) -> bool {
        self.frame().map_or(false, |frame| frame.header().has_caller())
    }

    pub(crate) fn slot(&self) -> &Slot<T> {
        &self.slot
    }

    pub(crate) fn frame(&self) -> Option<&Arc<Frame<T>>> {
        match &self.slot {
            Slot::Live(frame) => Some(frame),
            Slot::Empty | Slot::AllocFailed => None,
        }
    }

    pub(crate) fn into_frame(self) -> Option<Arc<Frame<T>>> {
        match self.slot {
            Slot::Live(frame) => Some(frame),
            Slot::Empty | Slot::AllocFailed => None,
        }
    }
}

impl<T> Default for Task<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.slot {
            Slot::Empty => f.write_str("Task(empty)"),
            Slot::AllocFailed => f.write_str("Task(alloc failed)"),
            Slot::Live(frame) => f
                .debug_struct("Task")
                .field("id", &frame.header().id())
                .field("status", &frame.header().status())
                .finish(),
        }
    }
}

impl<T: Send + 'static> IntoFuture for Task<T> {
    type Output = Option<T>;
    type IntoFuture = Join<T>;

    /// Run the computation to its end and take its value
    fn into_future(self) -> Join<T> {
        Join::new(self)
    }
}

impl<'a, T: Send + 'static> IntoFuture for &'a mut Task<T> {
    type Output = Option<T>;
    type IntoFuture = Resume<'a, T>;

    /// Resume the computation once and take the value it hands back, keeping the handle
    fn into_future(self) -> Resume<'a, T> {
        Resume::new(self)
    }
}

/// Non-owning alias of a computation
///
/// Held by callers links, ready queues and wait queues. Resuming through an
/// alias whose computation is gone is fatal.
#[derive(Clone)]
pub struct TaskRef {
    id: TaskId,
    inner: Weak<dyn Continuation>,
}

impl TaskRef {
    pub(crate) fn new(frame: &Arc<dyn Continuation>) -> Self {
        Self {
            id: frame.header().id(),
            inner: Arc::downgrade(frame),
        }
    }

    /// Identifier of the computation
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The computation still exists
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Status, if the computation still exists
    pub fn status(&self) -> Option<Status> {
        self.try_upgrade().map(|frame| frame.header().status())
    }

    /// Registered on a wait queue
    pub fn is_sleeping(&self) -> bool {
        self.try_upgrade()
            .map_or(false, |frame| frame.header().is_sleeping())
    }

    /// Sitting on a ready queue
    pub fn is_queued(&self) -> bool {
        self.try_upgrade()
            .map_or(false, |frame| frame.header().is_queued())
    }

    /// Put the computation back on the ready queue of its scheduler
    pub fn wake(&self) {
        let frame = self.upgrade();
        let header = frame.header();
        header.set_sleeping(false);
        let Some(scheduler) = header.scheduler() else {
            fatal(Violation::Unbound(self.id))
        };
        scheduler.schedule_ref(self.clone());
    }

    /// [`wake`](Self::wake) for wakers of foreign futures, which may outlive the computation
    pub(crate) fn wake_if_pending(&self) {
        let Some(frame) = self.try_upgrade() else {
            log::trace!("task {:?}: wakeup after destruction ignored", self.id);
            return;
        };
        let header = frame.header();
        if header.status().is_terminal() {
            return;
        }
        match header.scheduler() {
            Some(scheduler) => scheduler.schedule_ref(self.clone()),
            None => log::warn!("task {:?}: wakeup without a scheduler ignored", self.id),
        }
    }

    pub(crate) fn upgrade(&self) -> Arc<dyn Continuation> {
        match self.inner.upgrade() {
            Some(frame) => frame,
            None => fatal(Violation::ResumeDestroyed(self.id)),
        }
    }

    pub(crate) fn try_upgrade(&self) -> Option<Arc<dyn Continuation>> {
        self.inner.upgrade()
    }
}

impl PartialEq for TaskRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TaskRef {}

impl fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskRef").field(&self.id.as_u64()).finish()
    }
}
