//! Cooperative mutex

use super::wait_queue::{WaitList, WaitQueue};
use kcoro_hal::SpinLock;
use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// Mutual exclusion between computations
///
/// A computation that finds the mutex taken suspends on its wait queue
/// instead of spinning; releasing wakes the oldest waiter, which re-checks
/// and either takes the mutex or waits again. The guard is not tied to a
/// core, so a holder may suspend and resume anywhere before it releases.
pub struct CoMutex<T: ?Sized = ()> {
    locked: SpinLock<bool>,
    waiters: WaitQueue,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for CoMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for CoMutex<T> {}

impl<T> CoMutex<T> {
    /// Create an unlocked mutex
    pub fn new(value: T) -> Self {
        Self {
            locked: SpinLock::new("co_mutex", false),
            waiters: WaitQueue::named("co_mutex_waiters"),
            data: UnsafeCell::new(value),
        }
    }

    /// Consume the mutex, returning the protected value
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> CoMutex<T> {
    /// Acquire, suspending while some other computation holds it
    pub async fn lock(&self) -> CoMutexGuard<'_, T> {
        let mut locked = self.locked.lock();
        while *locked {
            locked = self.waiters.done(locked).await;
        }
        *locked = true;
        drop(locked);
        CoMutexGuard {
            mutex: self,
            _marker: PhantomData,
        }
    }

    /// Acquire if free
    pub fn try_lock(&self) -> Option<CoMutexGuard<'_, T>> {
        let mut locked = self.locked.lock();
        if *locked {
            return None;
        }
        *locked = true;
        Some(CoMutexGuard {
            mutex: self,
            _marker: PhantomData,
        })
    }

    /// Held by some computation
    pub fn is_locked(&self) -> bool {
        *self.locked.lock()
    }

    /// Number of computations waiting for it
    pub fn waiters(&self) -> usize {
        self.waiters.len()
    }

    /// Mutable access through an exclusive borrow; no locking needed
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    fn unlock(&self) {
        let mut locked = self.locked.lock();
        *locked = false;
        self.waiters.wake_up_one();
    }
}

impl<T: Default> Default for CoMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> fmt::Debug for CoMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoMutex")
            .field("locked", &self.is_locked())
            .field("waiters", &self.waiters())
            .finish()
    }
}

/// Held [`CoMutex`]; releases it on drop
#[must_use = "the mutex is released as soon as the guard is dropped"]
pub struct CoMutexGuard<'a, T: ?Sized> {
    mutex: &'a CoMutex<T>,
    _marker: PhantomData<&'a mut T>,
}

impl<T: ?Sized> CoMutexGuard<'_, T> {
    /// Release explicitly
    pub fn unlock(self) {
        drop(self);
    }
}

impl<T: ?Sized> Deref for CoMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves exclusive ownership of the mutex
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for CoMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves exclusive ownership of the mutex
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for CoMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{yield_now, Scheduler};
    use crate::task::Task;
    use parking_lot::Mutex;
    use std::cell::Cell;
    use std::sync::Arc;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    /// Resolves only when `T` is not `Sync`
    trait AmbiguousIfSync<A> {
        fn check() {}
    }
    impl<T: ?Sized> AmbiguousIfSync<()> for T {}
    impl<T: ?Sized + Sync> AmbiguousIfSync<u8> for T {}

    #[test]
    fn test_guard_is_sync_only_for_sync_data() {
        assert_send::<CoMutex<Cell<u32>>>();
        assert_sync::<CoMutex<Cell<u32>>>();
        assert_send::<CoMutexGuard<'static, u32>>();
        assert_sync::<CoMutexGuard<'static, u32>>();
        assert_send::<CoMutexGuard<'static, Cell<u32>>>();
        <CoMutexGuard<'static, Cell<u32>> as AmbiguousIfSync<_>>::check();
    }

    #[test]
    fn test_try_lock() {
        let mutex = CoMutex::new(5);
        let guard = mutex.try_lock().unwrap();
        assert!(mutex.is_locked());
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(!mutex.is_locked());
        assert_eq!(*mutex.try_lock().unwrap(), 5);
    }

    #[test]
    fn test_holder_suspending_keeps_others_out() {
        let scheduler = Scheduler::new(0);
        let mutex = Arc::new(CoMutex::new(Vec::new()));
        let trace = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let (m, t) = (mutex.clone(), trace.clone());
            scheduler.schedule(Task::new(async move {
                let mut held = m.lock().await;
                held.push(format!("{} in", tag));
                t.lock().push(format!("{} waiting={}", tag, m.waiters()));
                yield_now().await;
                held.push(format!("{} out", tag));
                Ok(())
            }));
        }
        scheduler.run_until_idle();

        let inner = Arc::try_unwrap(mutex).unwrap().into_inner();
        assert_eq!(inner, vec!["a in", "a out", "b in", "b out"]);
        assert_eq!(*trace.lock(), vec!["a waiting=0", "b waiting=0"]);
    }

    #[test]
    fn test_unlock_wakes_waiters_in_order() {
        let scheduler = Scheduler::new(0);
        let mutex = Arc::new(CoMutex::new(Vec::new()));
        let gate = mutex.try_lock();
        assert!(gate.is_some());

        for tag in 1..=3u32 {
            let m = mutex.clone();
            scheduler.schedule(Task::new(async move {
                m.lock().await.push(tag);
                Ok(())
            }));
        }
        scheduler.run_until_idle();
        assert_eq!(mutex.waiters(), 3);

        drop(gate);
        scheduler.run_until_idle();
        assert_eq!(mutex.waiters(), 0);
        assert!(!mutex.is_locked());
        assert_eq!(*mutex.try_lock().unwrap(), vec![1, 2, 3]);
    }
}
