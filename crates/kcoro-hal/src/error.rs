//! Kernel abort path
//!
//! There is no recovery from a broken locking or interrupt invariant. Every
//! violation is logged and then turned into a panic, which the kernel
//! profiles configure as `panic = "abort"`.

use std::fmt::Display;

/// Violations detected by the hardware layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HalViolation {
    /// The core already holding a spin-lock tried to take it again
    #[error("spin-lock `{name}` acquired twice by core {core}")]
    Reacquire {
        /// Lock name
        name: &'static str,
        /// Core that holds the lock
        core: usize,
    },

    /// A spin-lock was released by a core that does not hold it
    #[error("spin-lock `{0}` released while not held")]
    ReleaseUnheld(&'static str),

    /// `pop_off` without a matching `push_off`
    #[error("pop_off without matching push_off on core {0}")]
    UnbalancedPopOff(usize),

    /// `pop_off` found interrupts enabled inside a disabled section
    #[error("pop_off on core {0} while interruptible")]
    PopOffInterruptible(usize),

    /// A context-switch primitive was entered with interrupts enabled
    #[error("{op} on core {core} called with interrupts enabled")]
    InterruptsEnabled {
        /// Primitive name
        op: &'static str,
        /// Core the switch was attempted on
        core: usize,
    },

    /// A context was switched into after its entry function returned
    #[error("context `{0}` switched into after exit")]
    SwitchIntoExited(String),

    /// Spin-lock acquisition gave up (only with the `lock_timeout` feature)
    #[error("spin-lock `{0}` timed out")]
    LockTimeout(&'static str),
}

/// Log `reason` and abort the kernel.
#[cold]
#[track_caller]
pub fn abort(reason: impl Display) -> ! {
    log::error!("kernel abort: {}", reason);
    panic!("kernel abort: {}", reason);
}
