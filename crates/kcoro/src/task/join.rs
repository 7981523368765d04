//! Awaiting a computation from inside another one

use super::frame::{Continuation, Frame};
use super::handle::{Slot, Task};
use super::trampoline::{self, Directive};
use crate::error::{fatal, Violation};
use crate::task::{Status, TaskRef};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Future of `task.await`: consumes the handle, yields the final value
#[must_use = "futures do nothing unless awaited"]
pub struct Join<T> {
    task: Task<T>,
    entered: bool,
}

impl<T> Join<T> {
    pub(crate) fn new(task: Task<T>) -> Self {
        Self {
            task,
            entered: false,
        }
    }
}

impl<T: Send + 'static> Future for Join<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        poll_await(&this.task, &mut this.entered)
    }
}

/// Future of `(&mut task).await`: resumes once, keeps the handle
#[must_use = "futures do nothing unless awaited"]
pub struct Resume<'a, T> {
    task: &'a mut Task<T>,
    entered: bool,
}

impl<'a, T> Resume<'a, T> {
    pub(crate) fn new(task: &'a mut Task<T>) -> Self {
        Self {
            task,
            entered: false,
        }
    }
}

impl<T: Send + 'static> Future for Resume<'_, T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        poll_await(this.task, &mut this.entered)
    }
}

/// Transfer into `task`, and pick up its value once it hands control back
fn poll_await<T: Send + 'static>(task: &Task<T>, entered: &mut bool) -> Poll<Option<T>> {
    let frame = match task.slot() {
        Slot::Live(frame) => frame,
        Slot::AllocFailed => return Poll::Ready(None),
        Slot::Empty => {
            log::warn!("await on an empty task handle");
            return Poll::Ready(None);
        }
    };
    let header = frame.header();

    if *entered {
        // Woken some other way while the child is still going: keep waiting for it
        if !header.status().is_settled() {
            return Poll::Pending;
        }
        *entered = false;
        header.clear_caller();
        return Poll::Ready(outcome(frame));
    }

    match header.status() {
        Status::Done | Status::Failed => return Poll::Ready(outcome(frame)),
        Status::Running => fatal(Violation::AlreadyRunning(header.id())),
        Status::Init | Status::Suspended => {}
    }

    let Some(caller) = trampoline::current() else {
        fatal(Violation::NoContinuation("await"))
    };
    header.inherit_from(caller.header());
    header.set_caller(TaskRef::new(&caller));
    *entered = true;

    let callee: Arc<dyn Continuation> = frame.clone();
    trampoline::request(Directive::Enter(callee));
    Poll::Pending
}

fn outcome<T>(frame: &Frame<T>) -> Option<T> {
    match frame.header().status() {
        Status::Failed => None,
        _ => frame.take_result(),
    }
}
