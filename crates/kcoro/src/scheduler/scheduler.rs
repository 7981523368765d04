//! Per-core task scheduler

use super::executor;
use super::queue::ReadyQueue;
use crate::task::{trampoline, Continuation, Task, TaskRef};
use kcoro_hal::{ContextSwitch, Cpu};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Top-level computations handed to the scheduler
    pub tasks_scheduled: u64,

    /// Entries taken off the ready queue and resumed
    pub resumptions: u64,

    /// Computations that gave their turn away at a yield checkpoint
    pub yields: u64,

    /// Times the run loop found nothing to do and switched back to its host
    pub idle_switches: u64,
}

#[derive(Default)]
struct Counters {
    scheduled: AtomicU64,
    resumed: AtomicU64,
    yielded: AtomicU64,
    idle: AtomicU64,
}

/// Scheduler of one core
///
/// Shared as `Arc<Scheduler>`: computations keep a weak link to the
/// scheduler they re-enqueue themselves on, and wakeups from other cores
/// push onto the same queue.
pub struct Scheduler {
    /// Core this scheduler runs on
    core: usize,

    /// Computations ready to resume, oldest first
    queue: ReadyQueue,

    /// Set to make [`run`](Scheduler::run) return
    halted: AtomicBool,

    counters: Counters,
}

impl Scheduler {
    /// Create the scheduler of `core`
    pub fn new(core: usize) -> Arc<Self> {
        Self::with_capacity(core, 0)
    }

    /// Create the scheduler of `core` with room for `capacity` ready entries
    pub fn with_capacity(core: usize, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            core,
            queue: ReadyQueue::with_capacity(capacity),
            halted: AtomicBool::new(false),
            counters: Counters::default(),
        })
    }

    /// Core this scheduler runs on
    pub fn core(&self) -> usize {
        self.core
    }

    /// Run `task` on this core under an executor that absorbs its failure
    ///
    /// The scheduler owns the computation from now on. A handle with no
    /// computation behind it (empty or allocation-failed) is ignored.
    pub fn schedule<T: Send + 'static>(self: &Arc<Self>, task: Task<T>) {
        if task.frame().is_none() {
            log::debug!("scheduler {}: ignoring task without a body", self.core);
            return;
        }
        self.schedule_detached(executor::wrap(task));
    }

    /// Run `task` on this core without an executor
    ///
    /// Nothing absorbs a failure of `task` itself, so a failure that reaches
    /// it aborts the kernel.
    pub fn schedule_detached<T: Send + 'static>(self: &Arc<Self>, task: Task<T>) {
        let Some(frame) = task.into_frame() else {
            log::debug!("scheduler {}: ignoring task without a frame", self.core);
            return;
        };
        let cont: Arc<dyn Continuation> = frame;
        let header = cont.header();
        header.set_scheduler(self);
        header.adopt(cont.clone());
        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        log::debug!("scheduler {}: scheduled task {:?}", self.core, header.id());
        self.enqueue(&cont);
    }

    /// Put a suspended computation back on the queue
    pub(crate) fn schedule_ref(self: &Arc<Self>, task: TaskRef) {
        let cont = task.upgrade();
        self.enqueue(&cont);
    }

    /// [`schedule_ref`](Self::schedule_ref) from a yield checkpoint
    pub(crate) fn requeue(self: &Arc<Self>, task: TaskRef) {
        self.counters.yielded.fetch_add(1, Ordering::Relaxed);
        self.schedule_ref(task);
    }

    fn enqueue(self: &Arc<Self>, cont: &Arc<dyn Continuation>) {
        let header = cont.header();
        if !header.mark_queued() {
            log::trace!("task {:?}: already queued", header.id());
            return;
        }
        header.set_scheduler(self);
        self.queue.push(TaskRef::new(cont));
    }

    /// The ready queue is empty
    pub fn is_free(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of ready entries
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Nothing is ready
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Resume ready computations until the queue is empty; returns how many were resumed
    pub fn run_until_idle(&self) -> usize {
        let cpu = Cpu::current();
        let mut resumed = 0;
        while let Some(task) = self.queue.pop() {
            self.resume(&cpu, task);
            resumed += 1;
        }
        resumed
    }

    /// Run loop of a core
    ///
    /// Resumes ready computations in FIFO order. With nothing to do it
    /// switches back to `host` with interrupts off and tries again once the
    /// host resumes it. Returns after [`halt`](Self::halt).
    pub fn run(&self, host: &dyn ContextSwitch) {
        let cpu = Cpu::current();
        log::debug!("scheduler {}: running on cpu {}", self.core, cpu.id());
        while !self.is_halted() {
            match self.queue.pop() {
                Some(task) => self.resume(&cpu, task),
                None => {
                    self.counters.idle.fetch_add(1, Ordering::Relaxed);
                    let _irq = cpu.disable_interrupts();
                    host.switch_back();
                }
            }
        }
        log::debug!("scheduler {}: halted", self.core);
    }

    /// Make [`run`](Self::run) return the next time it looks
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    /// [`halt`](Self::halt) was called
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            tasks_scheduled: self.counters.scheduled.load(Ordering::Relaxed),
            resumptions: self.counters.resumed.load(Ordering::Relaxed),
            yields: self.counters.yielded.load(Ordering::Relaxed),
            idle_switches: self.counters.idle.load(Ordering::Relaxed),
        }
    }

    fn resume(&self, cpu: &Cpu, task: TaskRef) {
        let cont = task.upgrade();
        cont.header().clear_queued();
        self.counters.resumed.fetch_add(1, Ordering::Relaxed);

        // Computations run interruptible
        let was_on = cpu.intr_get();
        cpu.intr_on();
        trampoline::resume(cont);
        if !was_on {
            cpu.intr_off();
        }
    }
}
