//! Continuation frame: header state plus the typed body and result slot

use crate::error::{fatal, TaskResult, Violation};
use crate::scheduler::Scheduler;
use crate::task::{Status, TaskId, TaskRef};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Wake, Waker};

const NO_YIELD_UNSET: u8 = 0;
const NO_YIELD_OFF: u8 = 1;
const NO_YIELD_ON: u8 = 2;

/// Type-erased view of a frame, as the trampoline and the queues see it
pub(crate) trait Continuation: Send + Sync {
    fn header(&self) -> &Header;

    /// Run the body up to its next suspension point
    fn poll_body(&self, cx: &mut Context<'_>) -> Poll<TaskResult<()>>;

    /// Drop the body without running it again; the result slot stays
    fn abandon(&self);
}

/// State every continuation carries, whatever it produces
pub(crate) struct Header {
    id: TaskId,
    status: AtomicU8,

    /// Continuation currently awaiting this one
    caller: Mutex<Option<TaskRef>>,

    /// Scheduler this continuation re-enqueues itself on
    scheduler: Mutex<Option<Weak<Scheduler>>>,

    no_yield: AtomicU8,

    /// Failures reaching this level are handled by the caller
    has_error_handler: AtomicBool,

    /// Sitting on a ready queue
    queued: AtomicBool,

    /// Registered on a wait queue
    sleeping: AtomicBool,

    /// Self-reference of a top-level continuation; dropped once it settles
    owner: Mutex<Option<Arc<dyn Continuation>>>,

    waker: OnceCell<Waker>,
}

impl Header {
    fn new() -> Self {
        Self {
            id: TaskId::next(),
            status: AtomicU8::new(Status::Init as u8),
            caller: Mutex::new(None),
            scheduler: Mutex::new(None),
            no_yield: AtomicU8::new(NO_YIELD_UNSET),
            has_error_handler: AtomicBool::new(false),
            queued: AtomicBool::new(false),
            sleeping: AtomicBool::new(false),
            owner: Mutex::new(None),
            waker: OnceCell::new(),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub(crate) fn caller(&self) -> Option<TaskRef> {
        self.caller.lock().clone()
    }

    pub(crate) fn has_caller(&self) -> bool {
        self.caller.lock().is_some()
    }

    pub(crate) fn set_caller(&self, caller: TaskRef) {
        *self.caller.lock() = Some(caller);
    }

    pub(crate) fn clear_caller(&self) {
        *self.caller.lock() = None;
    }

    pub(crate) fn scheduler(&self) -> Option<Arc<Scheduler>> {
        self.scheduler.lock().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_scheduler(&self, scheduler: &Arc<Scheduler>) {
        *self.scheduler.lock() = Some(Arc::downgrade(scheduler));
    }

    /// Take the awaiter's scheduler (if we have none) and `no_yield` (if we never set our own)
    pub(crate) fn inherit_from(&self, parent: &Header) {
        {
            let mut scheduler = self.scheduler.lock();
            if scheduler.is_none() {
                *scheduler = parent.scheduler.lock().clone();
            }
        }
        let inherited = if parent.no_yield() {
            NO_YIELD_ON
        } else {
            NO_YIELD_OFF
        };
        let _ = self.no_yield.compare_exchange(
            NO_YIELD_UNSET,
            inherited,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn no_yield(&self) -> bool {
        self.no_yield.load(Ordering::Acquire) == NO_YIELD_ON
    }

    pub(crate) fn set_no_yield(&self, no_yield: bool) {
        let raw = if no_yield { NO_YIELD_ON } else { NO_YIELD_OFF };
        self.no_yield.store(raw, Ordering::Release);
    }

    pub(crate) fn has_error_handler(&self) -> bool {
        self.has_error_handler.load(Ordering::Acquire)
    }

    pub(crate) fn set_error_handler(&self, enabled: bool) {
        self.has_error_handler.store(enabled, Ordering::Release);
    }

    /// Returns false if it was already queued
    pub(crate) fn mark_queued(&self) -> bool {
        !self.queued.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn clear_queued(&self) {
        self.queued.store(false, Ordering::Release);
    }

    pub(crate) fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Acquire)
    }

    pub(crate) fn set_sleeping(&self, sleeping: bool) {
        self.sleeping.store(sleeping, Ordering::Release);
    }

    pub(crate) fn is_sleeping(&self) -> bool {
        self.sleeping.load(Ordering::Acquire)
    }

    /// Make the continuation own itself until it settles
    pub(crate) fn adopt(&self, this: Arc<dyn Continuation>) {
        *self.owner.lock() = Some(this);
    }

    pub(crate) fn release_owner(&self) -> Option<Arc<dyn Continuation>> {
        self.owner.lock().take()
    }

    /// Waker handed to foreign futures polled inside the body
    pub(crate) fn waker(&self, this: &TaskRef) -> &Waker {
        self.waker
            .get_or_init(|| Waker::from(Arc::new(Wakeup(this.clone()))))
    }
}

/// Re-enqueues a continuation when a foreign future wakes it
struct Wakeup(TaskRef);

impl Wake for Wakeup {
    fn wake(self: Arc<Self>) {
        self.0.wake_if_pending();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.wake_if_pending();
    }
}

pub(crate) type Body<T> = Pin<Box<dyn Future<Output = TaskResult<T>> + Send + 'static>>;

/// One continuation producing `T`s
pub(crate) struct Frame<T> {
    header: Header,
    body: Mutex<Option<Body<T>>>,
    result: Mutex<Option<T>>,
}

impl<T> Frame<T> {
    pub(crate) fn new(body: Body<T>) -> Self {
        Self {
            header: Header::new(),
            body: Mutex::new(Some(body)),
            result: Mutex::new(None),
        }
    }

    pub(crate) fn header(&self) -> &Header {
        &self.header
    }

    /// Put an intermediate value in the result slot
    pub(crate) fn store(&self, value: T) {
        *self.result.lock() = Some(value);
    }

    pub(crate) fn take_result(&self) -> Option<T> {
        self.result.lock().take()
    }
}

impl<T: Send + 'static> Continuation for Frame<T> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn poll_body(&self, cx: &mut Context<'_>) -> Poll<TaskResult<()>> {
        let mut body = self.body.lock();
        let Some(fut) = body.as_mut() else {
            fatal(Violation::ResumeDestroyed(self.header.id))
        };

        match fut.as_mut().poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(outcome) => {
                // The body's locals (child handles included) go away now
                *body = None;
                drop(body);
                Poll::Ready(outcome.map(|value| self.store(value)))
            }
        }
    }

    fn abandon(&self) {
        // Outside the lock: the body may own child frames
        let body = self.body.lock().take();
        drop(body);
    }
}

impl<T> Drop for Frame<T> {
    fn drop(&mut self) {
        let status = self.header.status();
        if matches!(status, Status::Running | Status::Suspended) && !std::thread::panicking() {
            fatal(Violation::DestroyedLive {
                id: self.header.id,
                status: status.as_str(),
            });
        }
        log::trace!("task {:?}: destroyed ({})", self.header.id, status.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_defaults() {
        let header = Header::new();
        assert_eq!(header.status(), Status::Init);
        assert!(!header.has_caller());
        assert!(header.scheduler().is_none());
        assert!(!header.no_yield());
        assert!(!header.has_error_handler());
        assert!(!header.is_queued());
    }

    #[test]
    fn test_no_yield_inheritance() {
        let parent = Header::new();
        parent.set_no_yield(true);

        let child = Header::new();
        child.inherit_from(&parent);
        assert!(child.no_yield());

        // A child that chose for itself keeps its choice
        let own = Header::new();
        own.set_no_yield(false);
        own.inherit_from(&parent);
        assert!(!own.no_yield());
    }

    #[test]
    fn test_scheduler_inheritance() {
        let s0 = Scheduler::new(0);
        let s1 = Scheduler::new(1);

        let parent = Header::new();
        parent.set_scheduler(&s0);

        let child = Header::new();
        child.inherit_from(&parent);
        assert_eq!(child.scheduler().unwrap().core(), 0);

        let bound = Header::new();
        bound.set_scheduler(&s1);
        bound.inherit_from(&parent);
        assert_eq!(bound.scheduler().unwrap().core(), 1);
    }

    #[test]
    fn test_mark_queued_once() {
        let header = Header::new();
        assert!(header.mark_queued());
        assert!(!header.mark_queued());
        header.clear_queued();
        assert!(header.mark_queued());
    }

    #[test]
    #[should_panic(expected = "destroyed while running")]
    fn test_destroying_running_frame_is_fatal() {
        let frame: Frame<u32> = Frame::new(Box::pin(async { Ok(1) }));
        frame.header().set_status(Status::Running);
        drop(frame);
    }

    #[test]
    fn test_abandon_drops_body_once() {
        struct Tracked(Arc<std::sync::atomic::AtomicUsize>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let tracked = Tracked(drops.clone());
        let frame: Frame<u32> = Frame::new(Box::pin(async move {
            let _tracked = tracked;
            Ok(1)
        }));
        frame.abandon();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        frame.abandon();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(frame.take_result().is_none());
    }
}
