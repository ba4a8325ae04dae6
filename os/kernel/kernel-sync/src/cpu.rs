use core::sync::atomic::{AtomicUsize, Ordering};

/// The executing processor, as seen by code that keeps per-core state.
///
/// `push_off`/`pop_off` nest: the thread stays on its core (interrupts and
/// preemption off) from the first `push_off` until the matching last
/// `pop_off`. While pinned, [`Cpu::id`] is stable.
pub trait Cpu: Sync {
    /// Index of the executing core, in `0..NCPU`.
    fn id(&self) -> usize;

    /// Disables preemption on the executing core; nests.
    fn push_off(&self);

    /// Undoes one [`Cpu::push_off`].
    fn pop_off(&self);
}

impl<C: Cpu + ?Sized> Cpu for &C {
    #[inline]
    fn id(&self) -> usize {
        (**self).id()
    }

    #[inline]
    fn push_off(&self) {
        (**self).push_off();
    }

    #[inline]
    fn pop_off(&self) {
        (**self).pop_off();
    }
}

/// RAII guard that pins the current thread to its core.
///
/// Calls [`Cpu::push_off`] on creation and [`Cpu::pop_off`] on drop, and
/// remembers the core id observed while pinned.
///
/// # Examples
///
/// ```
/// use kernel_sync::{PreemptGuard, UniCore};
///
/// let cpu = UniCore::new();
/// {
///     let pinned = PreemptGuard::new(&cpu);
///     assert_eq!(pinned.id(), 0);
///     assert_eq!(cpu.depth(), 1);
/// }
/// assert_eq!(cpu.depth(), 0);
/// ```
pub struct PreemptGuard<'a, C: Cpu + ?Sized> {
    cpu: &'a C,
    id: usize,
}

impl<'a, C: Cpu + ?Sized> PreemptGuard<'a, C> {
    #[inline]
    #[must_use]
    pub fn new(cpu: &'a C) -> Self {
        cpu.push_off();
        let id = cpu.id();
        Self { cpu, id }
    }

    /// The core this guard pinned us to.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }
}

impl<C: Cpu + ?Sized> Drop for PreemptGuard<'_, C> {
    fn drop(&mut self) {
        self.cpu.pop_off();
    }
}

/// A single-core machine: always core 0, tracks the nesting depth.
#[derive(Debug, Default)]
pub struct UniCore {
    depth: AtomicUsize,
}

impl UniCore {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            depth: AtomicUsize::new(0),
        }
    }

    /// Current `push_off` nesting depth.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

impl Cpu for UniCore {
    fn id(&self) -> usize {
        0
    }

    fn push_off(&self) {
        self.depth.fetch_add(1, Ordering::Relaxed);
    }

    fn pop_off(&self) {
        let prev = self.depth.fetch_sub(1, Ordering::Relaxed);
        assert!(prev > 0, "pop_off without push_off");
    }
}
