//! Symmetric transfer
//!
//! Polling a body never polls another body. When a computation needs to hand
//! control to someone else (the child it awaits, the caller it returns to)
//! it leaves a [`Directive`] and returns `Pending`; the loop in [`resume`]
//! then polls the next computation from the same native frame. Arbitrarily
//! deep await chains therefore run in constant native stack.

use super::frame::Continuation;
use crate::error::{fatal, TaskFailed, Violation};
use crate::task::{Status, TaskRef};
use std::cell::RefCell;
use std::sync::Arc;
use std::task::{Context, Poll};

/// What a suspending computation wants to happen next
pub(crate) enum Directive {
    /// Transfer into a child computation
    Enter(Arc<dyn Continuation>),
    /// An intermediate value is in the result slot; transfer to the caller
    Yielded,
    /// Suspended on a queue; control goes back to the scheduler
    Park,
}

struct Active {
    frame: Arc<dyn Continuation>,
    directive: Option<Directive>,
}

thread_local! {
    static ACTIVE: RefCell<Vec<Active>> = const { RefCell::new(Vec::new()) };
}

/// Computation being polled on this thread
pub(crate) fn current() -> Option<Arc<dyn Continuation>> {
    ACTIVE.with(|active| active.borrow().last().map(|top| top.frame.clone()))
}

/// Leave a directive for the loop polling the current computation
pub(crate) fn request(directive: Directive) {
    ACTIVE.with(|active| match active.borrow_mut().last_mut() {
        Some(top) => top.directive = Some(directive),
        None => fatal(Violation::NoContinuation("suspension")),
    })
}

enum Transfer {
    To(Arc<dyn Continuation>),
    Scheduler,
}

/// Run `start` and everything it transfers to until control goes back to the scheduler
pub(crate) fn resume(start: Arc<dyn Continuation>) {
    let mut current = start;
    loop {
        match step(&current) {
            Transfer::To(next) => {
                log::trace!(
                    "task {:?} -> task {:?}",
                    current.header().id(),
                    next.header().id()
                );
                current = next;
            }
            Transfer::Scheduler => return,
        }
    }
}

/// Pops the activation record even if the body unwinds
struct Activation {
    popped: bool,
}

impl Activation {
    fn push(frame: Arc<dyn Continuation>) -> Self {
        ACTIVE.with(|active| {
            active.borrow_mut().push(Active {
                frame,
                directive: None,
            })
        });
        Self { popped: false }
    }

    fn finish(mut self) -> Option<Directive> {
        self.popped = true;
        ACTIVE.with(|active| active.borrow_mut().pop().and_then(|top| top.directive))
    }
}

impl Drop for Activation {
    fn drop(&mut self) {
        if !self.popped {
            ACTIVE.with(|active| {
                active.borrow_mut().pop();
            });
        }
    }
}

fn step(cont: &Arc<dyn Continuation>) -> Transfer {
    let header = cont.header();
    header.set_status(Status::Running);
    let this = TaskRef::new(cont);
    let mut cx = Context::from_waker(header.waker(&this));

    let activation = Activation::push(cont.clone());
    let polled = cont.poll_body(&mut cx);
    let directive = activation.finish();

    match polled {
        Poll::Ready(Ok(())) => {
            header.set_status(Status::Done);
            complete(cont)
        }
        Poll::Ready(Err(TaskFailed)) => {
            header.set_status(Status::Failed);
            propagate_failure(cont)
        }
        Poll::Pending => match directive {
            Some(Directive::Enter(callee)) => Transfer::To(callee),
            Some(Directive::Yielded) => {
                header.set_status(Status::Suspended);
                match header.caller() {
                    Some(caller) => Transfer::To(caller.upgrade()),
                    None => Transfer::Scheduler,
                }
            }
            Some(Directive::Park) | None => Transfer::Scheduler,
        },
    }
}

fn complete(cont: &Arc<dyn Continuation>) -> Transfer {
    let header = cont.header();
    match header.caller() {
        Some(caller) => Transfer::To(caller.upgrade()),
        None => {
            // A top-level computation stops owning itself; whoever holds it last frees it
            if let Some(owner) = header.release_owner() {
                log::trace!("task {:?}: released", owner.header().id());
            }
            Transfer::Scheduler
        }
    }
}

/// Walk the caller chain up to the nearest failure boundary
///
/// Every level passed on the way is marked failed and loses its body, the
/// boundary included, innermost first: each body only still owns children
/// whose bodies are already gone. The caller of the boundary resumes and
/// observes an absent result.
fn propagate_failure(failed: &Arc<dyn Continuation>) -> Transfer {
    let origin = failed.header().id();
    let mut level = failed.clone();
    loop {
        let header = level.header();
        let Some(caller) = header.caller() else {
            fatal(Violation::UnhandledFailure(origin))
        };
        header.set_status(Status::Failed);
        level.abandon();
        if header.has_error_handler() {
            log::debug!(
                "task {:?}: failure handled at task {:?}, resuming task {:?}",
                origin,
                header.id(),
                caller.id()
            );
            return Transfer::To(caller.upgrade());
        }
        level = caller.upgrade();
    }
}
