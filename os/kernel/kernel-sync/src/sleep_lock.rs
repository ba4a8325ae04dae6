use crate::{SpinLock, yield_now};
use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
};

/// A lock meant to be held for a long time, e.g. across device I/O.
///
/// The `locked` flag lives behind a [`SpinLock`]; contenders release that
/// spin lock and [`yield_now`] between attempts instead of burning the core.
/// Holding the returned guard is the only way to reach the protected value,
/// so "is this caller the holder" is answered by the type system.
pub struct SleepLock<T> {
    locked: SpinLock<bool>,
    inner: UnsafeCell<T>,
}

// Safety: mutual exclusion; only T: Send may cross threads.
unsafe impl<T: Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            locked: SpinLock::new(false),
            inner: UnsafeCell::new(inner),
        }
    }

    /// Blocks (yielding) until the lock is ours.
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            yield_now();
        }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T>> {
        let mut locked = self.locked.lock();
        if *locked {
            return None;
        }
        *locked = true;
        Some(SleepLockGuard { lock: self })
    }

    /// Whether some guard is currently alive. Only a snapshot.
    pub fn is_locked(&self) -> bool {
        *self.locked.lock()
    }

    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

pub struct SleepLockGuard<'a, T> {
    lock: &'a SleepLock<T>,
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the guard proves exclusive ownership of the lock.
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves exclusive ownership of the lock.
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        *self.lock.locked.lock() = false;
    }
}
