use kernel_sync::SpinLock;

/// Source of "last used" timestamps for buffers.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// A tick counter advanced by the timer interrupt.
#[derive(Default)]
pub struct LogicalClock {
    ticks: SpinLock<u64>,
}

impl LogicalClock {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ticks: SpinLock::new(0),
        }
    }

    /// Advance by one tick; returns the new time.
    pub fn tick(&self) -> u64 {
        self.ticks.with_lock(|t| {
            *t += 1;
            *t
        })
    }
}

impl Clock for LogicalClock {
    fn now(&self) -> u64 {
        *self.ticks.lock()
    }
}

impl<K: Clock + ?Sized> Clock for &K {
    fn now(&self) -> u64 {
        (**self).now()
    }
}
