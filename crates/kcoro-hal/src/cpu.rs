//! Per-core interrupt state
//!
//! `push_off`/`pop_off` are like `intr_off`/`intr_on` except that they are
//! matched: it takes two `pop_off`s to undo two `push_off`s, and if
//! interrupts were off before the first `push_off` they stay off after the
//! last `pop_off`.
//!
//! The state lives on the core, not on the flow running it. Every stackful
//! context scheduled on a core shares the core's counter and keeps its own
//! interrupt-enable baseline by saving it across switches (see `context`).

use crate::error::{abort, HalViolation};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

thread_local! {
    static CURRENT: RefCell<Option<Arc<Cpu>>> = const { RefCell::new(None) };
}

/// One processor core
#[derive(Debug)]
pub struct Cpu {
    /// Core index
    id: usize,

    /// Simulated supervisor interrupt-enable bit
    interrupts: AtomicBool,

    /// Depth of `push_off` nesting
    noff: AtomicUsize,

    /// Were interrupts enabled before the outermost `push_off`?
    base_interrupt_status: AtomicBool,
}

impl Cpu {
    /// Create a core with interrupts disabled, as at boot
    pub fn new(id: usize) -> Self {
        Self {
            id,
            interrupts: AtomicBool::new(false),
            noff: AtomicUsize::new(0),
            base_interrupt_status: AtomicBool::new(false),
        }
    }

    /// Core index
    pub fn id(&self) -> usize {
        self.id
    }

    /// Make this core the one the calling thread runs on
    pub fn bind(self: &Arc<Self>) {
        CURRENT.with(|c| *c.borrow_mut() = Some(self.clone()));
    }

    /// The core the calling thread runs on
    ///
    /// A thread that was never bound gets a private core of its own, so an
    /// unbound thread never aliases another thread's lock ownership.
    pub fn current() -> Arc<Cpu> {
        CURRENT.with(|c| {
            c.borrow_mut()
                .get_or_insert_with(|| Arc::new(Cpu::new(0)))
                .clone()
        })
    }

    /// Are device interrupts enabled?
    pub fn intr_get(&self) -> bool {
        self.interrupts.load(Ordering::Acquire)
    }

    /// Enable device interrupts
    pub fn intr_on(&self) {
        self.interrupts.store(true, Ordering::Release);
    }

    /// Disable device interrupts
    pub fn intr_off(&self) {
        self.interrupts.store(false, Ordering::Release);
    }

    /// Disable interrupts, counting nesting depth
    pub fn push_off(&self) {
        let old = self.intr_get();
        self.intr_off();
        if self.noff.load(Ordering::Relaxed) == 0 {
            self.base_interrupt_status.store(old, Ordering::Relaxed);
        }
        self.noff.fetch_add(1, Ordering::Relaxed);
    }

    /// Undo one `push_off`, re-enabling interrupts once nesting unwinds
    pub fn pop_off(&self) {
        if self.intr_get() {
            abort(HalViolation::PopOffInterruptible(self.id));
        }
        let depth = self.noff.load(Ordering::Relaxed);
        if depth == 0 {
            abort(HalViolation::UnbalancedPopOff(self.id));
        }
        self.noff.store(depth - 1, Ordering::Relaxed);
        if depth == 1 && self.base_interrupt_status.load(Ordering::Relaxed) {
            self.intr_on();
        }
    }

    /// `push_off` now, `pop_off` when the guard drops
    pub fn disable_interrupts(&self) -> InterruptGuard<'_> {
        self.push_off();
        InterruptGuard { cpu: self }
    }

    /// Current `push_off` nesting depth
    pub fn depth(&self) -> usize {
        self.noff.load(Ordering::Relaxed)
    }

    /// Interrupt state the outermost `pop_off` will restore
    pub fn base_interrupt_status(&self) -> bool {
        self.base_interrupt_status.load(Ordering::Relaxed)
    }

    pub(crate) fn set_base_interrupt_status(&self, enabled: bool) {
        self.base_interrupt_status.store(enabled, Ordering::Relaxed);
    }

    /// Identity used for lock ownership
    pub(crate) fn token(&self) -> usize {
        self as *const Cpu as usize
    }
}

/// Scoped interrupt-disabled section, see [`Cpu::disable_interrupts`]
#[must_use = "interrupts are re-enabled as soon as the guard is dropped"]
pub struct InterruptGuard<'a> {
    cpu: &'a Cpu,
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        self.cpu.pop_off();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_restores_enabled() {
        let cpu = Cpu::new(0);
        cpu.intr_on();

        cpu.push_off();
        cpu.push_off();
        assert!(!cpu.intr_get());
        assert_eq!(cpu.depth(), 2);

        cpu.pop_off();
        // Still nested: stays off
        assert!(!cpu.intr_get());

        cpu.pop_off();
        assert!(cpu.intr_get());
        assert_eq!(cpu.depth(), 0);
    }

    #[test]
    fn test_push_pop_keeps_disabled() {
        let cpu = Cpu::new(1);
        assert!(!cpu.intr_get());

        {
            let _outer = cpu.disable_interrupts();
            let _inner = cpu.disable_interrupts();
            assert_eq!(cpu.depth(), 2);
        }

        assert!(!cpu.intr_get());
        assert_eq!(cpu.depth(), 0);
    }

    #[test]
    #[should_panic(expected = "pop_off without matching push_off")]
    fn test_unbalanced_pop_off() {
        Cpu::new(0).pop_off();
    }

    #[test]
    #[should_panic(expected = "while interruptible")]
    fn test_pop_off_interruptible() {
        let cpu = Cpu::new(0);
        cpu.push_off();
        cpu.intr_on();
        cpu.pop_off();
    }

    #[test]
    fn test_bind_and_current() {
        let cpu = Arc::new(Cpu::new(7));
        cpu.bind();
        assert_eq!(Cpu::current().id(), 7);
        assert!(Arc::ptr_eq(&Cpu::current(), &cpu));
    }

    #[test]
    fn test_unbound_threads_get_distinct_cores() {
        let here = Cpu::current();
        let there = std::thread::spawn(|| Cpu::current().token())
            .join()
            .unwrap();
        assert_ne!(here.token(), there);
    }
}
