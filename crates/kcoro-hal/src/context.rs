//! Stackful execution contexts
//!
//! A stackful context is a flow of control with its own machine stack that
//! the process scheduler switches into and that switches back out on its
//! own. The cooperative runtime needs exactly two primitives from this layer:
//!
//! - `switch_back`: save the running flow and hand the processor back to
//!   whatever switched into it ([`ContextSwitch`])
//! - `save_and_switch`: save the current flow and transfer into a saved
//!   context; the first switch into a fresh context starts its entry
//!   function on a dedicated stack (save-and-run)
//!
//! Both must be entered with local interrupts disabled and both preserve the
//! core's interrupt-enable baseline for the flow that called them.
//!
//! In the hosted build every context is an OS thread. Exactly one of the
//! host and the context holds the baton at a time, so the pair behaves like
//! a single core switching between two stacks.

use crate::cpu::Cpu;
use crate::error::{abort, HalViolation};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// The primitive a flow uses to give up the processor
pub trait ContextSwitch: Send + Sync {
    /// Save the running flow and transfer back to whatever switched into it.
    ///
    /// Returns once the flow is switched into again. Local interrupts must
    /// be disabled.
    fn switch_back(&self);
}

/// Outcome of switching into a context
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Switched {
    /// The context called `switch_back` and can be resumed again
    Yielded,
    /// The context's entry function returned
    Exited,
}

/// Who is running: the flow that switched in, or the context
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Turn {
    Host,
    Guest,
    Exited,
}

struct Baton {
    turn: Mutex<Turn>,
    cv: Condvar,
}

impl Baton {
    fn new() -> Self {
        Self {
            turn: Mutex::new(Turn::Host),
            cv: Condvar::new(),
        }
    }

    fn pass(&self, to: Turn) {
        *self.turn.lock() = to;
        self.cv.notify_all();
    }

    fn wait_while(&self, turn: Turn) -> Turn {
        let mut current = self.turn.lock();
        while *current == turn {
            self.cv.wait(&mut current);
        }
        *current
    }
}

type Entry = Box<dyn FnOnce(Arc<StackfulContext>) + Send + 'static>;

/// A flow of control with its own stack, bound to one core
pub struct StackfulContext {
    name: String,
    cpu: Arc<Cpu>,
    stack_size: Option<usize>,
    baton: Baton,
    entry: Mutex<Option<Entry>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl StackfulContext {
    /// Prepare a fresh context that will run `entry` on the first switch into it
    pub fn new<F>(name: impl Into<String>, cpu: Arc<Cpu>, entry: F) -> Arc<Self>
    where
        F: FnOnce(Arc<StackfulContext>) + Send + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            cpu,
            stack_size: None,
            baton: Baton::new(),
            entry: Mutex::new(Some(Box::new(entry))),
            thread: Mutex::new(None),
        })
    }

    /// Like [`StackfulContext::new`], with a dedicated stack of `stack_size` bytes
    pub fn with_stack_size<F>(
        name: impl Into<String>,
        cpu: Arc<Cpu>,
        stack_size: usize,
        entry: F,
    ) -> Arc<Self>
    where
        F: FnOnce(Arc<StackfulContext>) + Send + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            cpu,
            stack_size: Some(stack_size),
            baton: Baton::new(),
            entry: Mutex::new(Some(Box::new(entry))),
            thread: Mutex::new(None),
        })
    }

    /// Context name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Core this context runs on
    pub fn cpu(&self) -> &Arc<Cpu> {
        &self.cpu
    }

    /// Has the entry function returned?
    pub fn has_exited(&self) -> bool {
        *self.baton.turn.lock() == Turn::Exited
    }

    /// Save the current flow and transfer into this context.
    ///
    /// The first call starts the entry function (save-and-run). Returns when
    /// the context switches back or exits. Local interrupts must be disabled.
    pub fn save_and_switch(self: &Arc<Self>) -> Switched {
        self.require_interrupts_off("save_and_switch");
        if self.has_exited() {
            abort(HalViolation::SwitchIntoExited(self.name.clone()));
        }

        let baseline = self.cpu.base_interrupt_status();
        if let Some(entry) = self.entry.lock().take() {
            self.save_and_run(entry);
        } else {
            log::trace!("context `{}`: switch in", self.name);
            self.baton.pass(Turn::Guest);
        }
        let turn = self.baton.wait_while(Turn::Guest);
        self.cpu.set_base_interrupt_status(baseline);

        match turn {
            Turn::Exited => {
                log::debug!("context `{}` exited", self.name);
                Switched::Exited
            }
            _ => Switched::Yielded,
        }
    }

    /// Wait for the thread behind an exited context to finish
    pub fn join(&self) {
        if !self.has_exited() {
            return;
        }
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                log::error!("context `{}` panicked", self.name);
            }
        }
    }

    fn save_and_run(self: &Arc<Self>, entry: Entry) {
        log::debug!("context `{}`: start on core {}", self.name, self.cpu.id());
        let this = self.clone();
        let mut builder = thread::Builder::new().name(self.name.clone());
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }

        self.baton.pass(Turn::Guest);
        let spawned = builder.spawn(move || {
            this.cpu.bind();
            this.baton.wait_while(Turn::Host);
            let exit = ExitOnDrop(this.clone());
            entry(this);
            drop(exit);
        });

        match spawned {
            Ok(handle) => *self.thread.lock() = Some(handle),
            Err(err) => {
                self.baton.pass(Turn::Exited);
                log::error!("context `{}`: failed to start: {}", self.name, err);
            }
        }
    }

    fn require_interrupts_off(&self, op: &'static str) {
        if self.cpu.intr_get() {
            abort(HalViolation::InterruptsEnabled {
                op,
                core: self.cpu.id(),
            });
        }
    }
}

impl ContextSwitch for StackfulContext {
    fn switch_back(&self) {
        self.require_interrupts_off("switch_back");
        let baseline = self.cpu.base_interrupt_status();
        log::trace!("context `{}`: switch back", self.name);
        self.baton.pass(Turn::Host);
        self.baton.wait_while(Turn::Host);
        self.cpu.set_base_interrupt_status(baseline);
    }
}

impl fmt::Debug for StackfulContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackfulContext")
            .field("name", &self.name)
            .field("core", &self.cpu.id())
            .field("turn", &*self.baton.turn.lock())
            .finish()
    }
}

/// Hands the baton back for good when the entry function ends, panic included
struct ExitOnDrop(Arc<StackfulContext>);

impl Drop for ExitOnDrop {
    fn drop(&mut self) {
        self.0.baton.pass(Turn::Exited);
    }
}
