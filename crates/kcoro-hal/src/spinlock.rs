//! Interrupt-masking spin-lock
//!
//! Acquiring pushes the current core's interrupt nesting counter before
//! spinning, so a lock holder is never interrupted on its own core and
//! the interrupt-enable state comes back exactly once all nesting unwinds.

use crate::cpu::Cpu;
use crate::error::{abort, HalViolation};
use crossbeam::utils::Backoff;
use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[cfg(feature = "lock_timeout")]
const SPIN_LIMIT: u64 = 1 << 26;

/// A spin-lock protecting a `T`
pub struct SpinLock<T: ?Sized> {
    name: &'static str,
    locked: AtomicBool,
    /// Token of the holding core, 0 when free
    holder: AtomicUsize,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Create an unlocked spin-lock
    pub const fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            locked: AtomicBool::new(false),
            holder: AtomicUsize::new(0),
            data: UnsafeCell::new(value),
        }
    }

    /// Consume the lock, returning the protected value
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Lock name, used in diagnostics
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquire the lock, spinning until it is free
    pub fn lock(&self) -> SpinGuard<'_, T> {
        let cpu = Cpu::current();
        cpu.push_off();
        if self.holding(&cpu) {
            abort(HalViolation::Reacquire {
                name: self.name,
                core: cpu.id(),
            });
        }

        let backoff = Backoff::new();
        #[cfg(feature = "lock_timeout")]
        let mut spins: u64 = 0;
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            backoff.snooze();
            #[cfg(feature = "lock_timeout")]
            {
                spins += 1;
                if spins > SPIN_LIMIT {
                    abort(HalViolation::LockTimeout(self.name));
                }
            }
        }
        self.holder.store(cpu.token(), Ordering::Relaxed);

        SpinGuard {
            lock: self,
            cpu,
            _marker: PhantomData,
        }
    }

    /// Acquire the lock only if it is free right now
    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        let cpu = Cpu::current();
        cpu.push_off();
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            cpu.pop_off();
            return None;
        }
        self.holder.store(cpu.token(), Ordering::Relaxed);
        Some(SpinGuard {
            lock: self,
            cpu,
            _marker: PhantomData,
        })
    }

    /// Is `cpu` holding this lock?
    ///
    /// Interrupts must be off.
    pub fn holding(&self, cpu: &Cpu) -> bool {
        self.locked.load(Ordering::Relaxed) && self.holder.load(Ordering::Relaxed) == cpu.token()
    }

    /// Is anyone holding this lock?
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    fn unlock(&self, cpu: &Cpu) {
        if !self.holding(cpu) {
            abort(HalViolation::ReleaseUnheld(self.name));
        }
        self.holder.store(0, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        cpu.pop_off();
    }
}

impl<T: ?Sized> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("name", &self.name)
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Held spin-lock; releases it on drop
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SpinGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
    cpu: Arc<Cpu>,
    // Shared access to the guard hands out `&T`
    _marker: PhantomData<&'a mut T>,
}

impl<'a, T: ?Sized> SpinGuard<'a, T> {
    /// The lock this guard holds
    ///
    /// Lets a waiter that has to release the guard around a suspension
    /// take the same lock again afterwards.
    pub fn lock_ref(&self) -> &'a SpinLock<T> {
        self.lock
    }

    /// Release the lock explicitly
    pub fn unlock(self) {
        drop(self);
    }
}

impl<T: ?Sized> Deref for SpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock(&self.cpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::thread;

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
        assert_send::<SpinGuard<'static, u32>>();
        assert_sync::<SpinGuard<'static, u32>>();
        assert_send::<SpinGuard<'static, Cell<u32>>>();
        <SpinGuard<'static, Cell<u32>> as AmbiguousIfSync<_>>::check();
    }

    #[test]
    fn test_lock_masks_interrupts() {
        let cpu = Arc::new(Cpu::new(0));
        cpu.bind();
        cpu.intr_on();

        let lock = SpinLock::new("test", 0u32);
        {
            let mut guard = lock.lock();
            *guard += 1;
            assert!(!cpu.intr_get());
            assert!(lock.holding(&cpu));
        }

        assert!(cpu.intr_get());
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn test_nested_locks_restore_once() {
        let cpu = Arc::new(Cpu::new(0));
        cpu.bind();
        cpu.intr_on();

        let a = SpinLock::new("a", ());
        let b = SpinLock::new("b", ());
        let ga = a.lock();
        let gb = b.lock();
        assert_eq!(cpu.depth(), 2);
        drop(ga);
        assert!(!cpu.intr_get());
        drop(gb);
        assert!(cpu.intr_get());
    }

    #[test]
    fn test_try_lock() {
        let lock = SpinLock::new("try", 5);
        let guard = lock.try_lock().unwrap();
        assert_eq!(*guard, 5);

        let other = thread::scope(|s| s.spawn(|| lock.try_lock().is_none()).join().unwrap());
        assert!(other);
        drop(guard);
        assert!(lock.try_lock().is_some());
    }

    #[test]
    #[should_panic(expected = "acquired twice")]
    fn test_reacquire_is_fatal() {
        let lock = SpinLock::new("twice", ());
        let _first = lock.lock();
        let _second = lock.lock();
    }

    #[test]
    fn test_cross_thread_exclusion() {
        let lock = Arc::new(SpinLock::new("counter", 0u64));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let lock = lock.clone();
                thread::spawn(move || {
                    Arc::new(Cpu::new(i)).bind();
                    for _ in 0..10_000 {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 40_000);
    }
}
