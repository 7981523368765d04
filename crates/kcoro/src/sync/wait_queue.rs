//! Wait queues
//!
//! A computation about to wait checks its condition under a spin-lock, then
//! calls [`WaitList::done`] with the guard. `done` registers the computation,
//! releases the lock and suspends; after a wakeup it takes the lock again
//! and hands back a fresh guard so the condition can be re-checked. A wakeup
//! in between unlocking and suspending only puts the computation back on its
//! ready queue, so it is never lost.

use crate::error::{fatal, Violation};
use crate::task::trampoline::{self, Directive};
use crate::task::TaskRef;
use kcoro_hal::{SpinGuard, SpinLock};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Something a wait queue can hold and wake
pub trait Sleepable: Send {
    /// Called once when it is registered
    fn sleep(&mut self);

    /// Called once when it is taken off the queue
    fn wake_up(self: Box<Self>);
}

/// Sleeper for a computation: waking it reschedules it on its own scheduler
pub struct TaskSleeper {
    task: TaskRef,
}

impl TaskSleeper {
    /// Sleeper for `task`
    pub fn new(task: TaskRef) -> Self {
        Self { task }
    }

    /// Sleeper for the computation being run, if any
    pub fn current() -> Option<Self> {
        crate::task::current().map(Self::new)
    }

    /// Computation this sleeper wakes
    pub fn task(&self) -> &TaskRef {
        &self.task
    }
}

impl Sleepable for TaskSleeper {
    fn sleep(&mut self) {
        log::trace!("task {:?}: sleeping", self.task.id());
        if let Some(cont) = self.task.try_upgrade() {
            cont.header().set_sleeping(true);
        }
    }

    fn wake_up(self: Box<Self>) {
        log::trace!("task {:?}: woken", self.task.id());
        self.task.wake();
    }
}

/// Common face of wait queues
pub trait WaitList: Sync {
    /// Register `sleeper`
    fn sleep(&self, sleeper: Box<dyn Sleepable>);

    /// Wake what the queue wakes on an event; returns how many were woken
    fn wake_up(&self) -> usize;

    /// Release `guard` and suspend until woken, then relock
    ///
    /// With `no_yield` set on the current computation this only unlocks and
    /// relocks, so the caller's condition loop spins.
    fn done<'a, T: ?Sized>(&'a self, guard: SpinGuard<'a, T>) -> Done<'a, Self, T>
    where
        Self: Sized,
    {
        Done {
            queue: self,
            lock: guard.lock_ref(),
            guard: Some(guard),
            slept: false,
        }
    }
}

/// FIFO wait queue for any number of sleepers
pub struct WaitQueue {
    sleepers: SpinLock<VecDeque<Box<dyn Sleepable>>>,
}

impl WaitQueue {
    /// Create an empty wait queue
    pub fn new() -> Self {
        Self::named("wait_queue")
    }

    /// Create an empty wait queue whose lock is called `name`
    pub fn named(name: &'static str) -> Self {
        Self {
            sleepers: SpinLock::new(name, VecDeque::new()),
        }
    }

    /// Wake the oldest sleeper; false if there was none
    pub fn wake_up_one(&self) -> bool {
        let front = self.sleepers.lock().pop_front();
        match front {
            Some(sleeper) => {
                sleeper.wake_up();
                true
            }
            None => false,
        }
    }

    /// Wake every sleeper, oldest first
    pub fn wake_up_all(&self) -> usize {
        let all = std::mem::take(&mut *self.sleepers.lock());
        let woken = all.len();
        for sleeper in all {
            sleeper.wake_up();
        }
        woken
    }

    /// Number of sleepers
    pub fn len(&self) -> usize {
        self.sleepers.lock().len()
    }

    /// No sleepers
    pub fn is_empty(&self) -> bool {
        self.sleepers.lock().is_empty()
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitList for WaitQueue {
    fn sleep(&self, mut sleeper: Box<dyn Sleepable>) {
        sleeper.sleep();
        self.sleepers.lock().push_back(sleeper);
    }

    /// Wakes all
    fn wake_up(&self) -> usize {
        self.wake_up_all()
    }
}

/// Wait queue with room for exactly one sleeper
///
/// A second sleeper is a protocol violation and aborts.
pub struct SingleWaitQueue {
    slot: SpinLock<Option<Box<dyn Sleepable>>>,
}

impl SingleWaitQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::named("single_wait_queue")
    }

    /// Create an empty queue whose lock is called `name`
    pub fn named(name: &'static str) -> Self {
        Self {
            slot: SpinLock::new(name, None),
        }
    }

    /// A sleeper is registered
    pub fn is_occupied(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// No sleeper is registered
    pub fn is_empty(&self) -> bool {
        !self.is_occupied()
    }
}

impl Default for SingleWaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitList for SingleWaitQueue {
    fn sleep(&self, mut sleeper: Box<dyn Sleepable>) {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            fatal(Violation::SlotOccupied(self.slot.name()));
        }
        sleeper.sleep();
        *slot = Some(sleeper);
    }

    fn wake_up(&self) -> usize {
        let sleeper = self.slot.lock().take();
        match sleeper {
            Some(sleeper) => {
                sleeper.wake_up();
                1
            }
            None => 0,
        }
    }
}

/// Future of [`WaitList::done`]
#[must_use = "futures do nothing unless awaited"]
pub struct Done<'a, Q, T: ?Sized> {
    queue: &'a Q,
    lock: &'a SpinLock<T>,
    guard: Option<SpinGuard<'a, T>>,
    slept: bool,
}

impl<'a, Q: WaitList, T: ?Sized> Future for Done<'a, Q, T> {
    type Output = SpinGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<SpinGuard<'a, T>> {
        let this = self.get_mut();
        if this.slept {
            return Poll::Ready(this.lock.lock());
        }
        let Some(current) = trampoline::current() else {
            fatal(Violation::NoContinuation("wait_queue.done"))
        };

        if current.header().no_yield() {
            drop(this.guard.take());
            return Poll::Ready(this.lock.lock());
        }

        this.queue
            .sleep(Box::new(TaskSleeper::new(TaskRef::new(&current))));
        drop(this.guard.take());
        this.slept = true;
        trampoline::request(Directive::Park);
        Poll::Pending
    }
}
