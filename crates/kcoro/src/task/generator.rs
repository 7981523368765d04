//! Generators: computations handing back a sequence of values

use super::frame::Frame;
use super::handle::Task;
use super::trampoline::{self, Directive};
use crate::error::{fatal, TaskResult, Violation};
use crate::task::Status;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

/// A computation that suspends with a value at every [`Yielder::yield_value`]
///
/// Each [`next`](Generator::next) resumes it once. `None` means it has
/// finished (or failed); the body's own return carries no value.
pub struct Generator<T> {
    task: Task<Option<T>>,
}

impl<T: Send + 'static> Generator<T> {
    /// Build a generator; `producer` gets the [`Yielder`] its body yields through
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(Yielder<T>) -> Fut,
        Fut: Future<Output = TaskResult<()>> + Send + 'static,
    {
        let frame = Arc::new_cyclic(|frame: &Weak<Frame<Option<T>>>| {
            let body = producer(Yielder {
                frame: frame.clone(),
            });
            Frame::new(Box::pin(async move { body.await.map(|()| None) }))
        });
        Self {
            task: Task::from_frame(frame),
        }
    }

    /// Resume until the next value
    pub async fn next(&mut self) -> Option<T> {
        (&mut self.task).await.flatten()
    }

    /// Finished or failed; further `next` calls return `None`
    pub fn is_finished(&self) -> bool {
        self.task.status().map_or(true, Status::is_terminal)
    }

    /// Underlying computation
    pub fn task(&self) -> &Task<Option<T>> {
        &self.task
    }

    /// Give up the generator wrapper, keeping the computation
    pub fn into_task(self) -> Task<Option<T>> {
        self.task
    }
}

/// Yield side of a [`Generator`]; usable only from inside that generator
pub struct Yielder<T> {
    frame: Weak<Frame<Option<T>>>,
}

impl<T: Send + 'static> Yielder<T> {
    /// Hand `value` to whoever resumed the generator and suspend
    pub fn yield_value(&self, value: T) -> YieldValue<'_, T> {
        YieldValue {
            yielder: self,
            value: Some(value),
        }
    }
}

/// Future of [`Yielder::yield_value`]
#[must_use = "futures do nothing unless awaited"]
pub struct YieldValue<'a, T> {
    yielder: &'a Yielder<T>,
    value: Option<T>,
}

impl<T> Unpin for YieldValue<'_, T> {}

impl<T: Send + 'static> Future for YieldValue<'_, T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let Some(value) = this.value.take() else {
            return Poll::Ready(());
        };
        let Some(frame) = this.yielder.frame.upgrade() else {
            fatal(Violation::NoContinuation("yield_value"))
        };

        let running = trampoline::current();
        let here = running.as_ref().map_or(false, |cont| {
            Arc::as_ptr(cont) as *const () == Arc::as_ptr(&frame) as *const ()
        });
        if !here {
            fatal(Violation::ForeignYield {
                generator: frame.header().id(),
                actual: running.map(|cont| cont.header().id()),
            });
        }

        frame.store(Some(value));
        trampoline::request(Directive::Yielded);
        Poll::Pending
    }
}
