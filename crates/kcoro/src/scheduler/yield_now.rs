//! Yield checkpoint

use crate::task::trampoline::{self, Directive};
use crate::task::TaskRef;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Give the rest of this turn to other ready computations
///
/// Continues at once when there is nothing else to run, when the current
/// computation has `no_yield` set, or when it is not bound to a scheduler.
/// Outside of a computation it is a no-op.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future of [`yield_now`]
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        let Some(current) = trampoline::current() else {
            return Poll::Ready(());
        };
        let header = current.header();
        if header.no_yield() {
            return Poll::Ready(());
        }
        let Some(scheduler) = header.scheduler() else {
            return Poll::Ready(());
        };
        if scheduler.is_free() {
            return Poll::Ready(());
        }

        self.yielded = true;
        scheduler.requeue(TaskRef::new(&current));
        trampoline::request(Directive::Park);
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use crate::task::Task;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    fn trace_task(trace: &Trace, tag: &'static str) -> Task<()> {
        let trace = trace.clone();
        Task::new(async move {
            trace.lock().push(tag);
            Ok(())
        })
    }

    #[test]
    fn test_yield_lets_queued_tasks_run_first() {
        let scheduler = Scheduler::new(0);
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));

        let a = trace.clone();
        scheduler.schedule(Task::new(async move {
            a.lock().push("a1");
            yield_now().await;
            a.lock().push("a2");
            Ok(())
        }));
        scheduler.schedule(trace_task(&trace, "b"));
        scheduler.schedule(trace_task(&trace, "c"));
        scheduler.run_until_idle();

        assert_eq!(*trace.lock(), vec!["a1", "b", "c", "a2"]);
        assert_eq!(scheduler.stats().yields, 1);
    }

    #[test]
    fn test_yield_with_empty_queue_continues() {
        let scheduler = Scheduler::new(0);
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let a = trace.clone();
        scheduler.schedule(Task::new(async move {
            a.lock().push("a1");
            yield_now().await;
            a.lock().push("a2");
            Ok(())
        }));
        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(*trace.lock(), vec!["a1", "a2"]);
        assert_eq!(scheduler.stats().yields, 0);
    }

    #[test]
    fn test_no_yield_continues() {
        let scheduler = Scheduler::new(0);
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let a = trace.clone();
        let task = Task::new(async move {
            a.lock().push("a1");
            yield_now().await;
            a.lock().push("a2");
            Ok(())
        });
        task.set_no_yield(true);
        scheduler.schedule(task);
        scheduler.schedule(trace_task(&trace, "b"));
        scheduler.run_until_idle();
        assert_eq!(*trace.lock(), vec!["a1", "a2", "b"]);
    }

    #[test]
    fn test_no_yield_is_inherited_by_awaited_child() {
        let scheduler = Scheduler::new(0);
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let a = trace.clone();
        let parent = Task::new(async move {
            let c = a.clone();
            let child = Task::new(async move {
                c.lock().push("child1");
                yield_now().await;
                c.lock().push("child2");
                Ok(())
            });
            child.await;
            a.lock().push("parent");
            Ok(())
        });
        parent.set_no_yield(true);
        scheduler.schedule(parent);
        scheduler.schedule(trace_task(&trace, "b"));
        scheduler.run_until_idle();
        assert_eq!(*trace.lock(), vec!["child1", "child2", "parent", "b"]);
    }

    struct NoopWake;

    impl std::task::Wake for NoopWake {
        fn wake(self: Arc<Self>) {}
    }

    #[test]
    fn test_yield_outside_continuation_is_noop() {
        let mut fut = yield_now();
        let waker = std::task::Waker::from(Arc::new(NoopWake));
        let mut cx = Context::from_waker(&waker);
        assert_eq!(Pin::new(&mut fut).poll(&mut cx), Poll::Ready(()));
    }
}
