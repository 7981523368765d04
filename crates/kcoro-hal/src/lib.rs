//! kcoro hardware layer
//!
//! The pieces of the cooperative runtime that talk to the processor:
//! - **Cpu**: per-core interrupt enable flag and nested disable counting (`cpu` module)
//! - **SpinLock**: cross-core mutual exclusion that masks local interrupts while held (`spinlock` module)
//! - **StackfulContext**: the two context-switch primitives that host a flow on its own stack (`context` module)
//! - **abort**: the kernel abort path taken on protocol violations (`error` module)
//!
//! This build is hosted: interrupts are a simulated per-core flag and each
//! stackful context is an OS thread that runs only while it holds the core's baton.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod context;
pub mod cpu;
pub mod error;
pub mod spinlock;

pub use context::{ContextSwitch, StackfulContext, Switched};
pub use cpu::{Cpu, InterruptGuard};
pub use error::{abort, HalViolation};
pub use spinlock::{SpinGuard, SpinLock};
