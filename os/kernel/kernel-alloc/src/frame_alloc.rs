//! Per-core sharded frame allocator.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
use kernel_info::params::{ALLOC_JUNK, FREE_JUNK, NCPU};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, page_round_down};
use kernel_sync::{Cpu, PreemptGuard, SpinLock};
use kernel_vmem::{FrameAlloc, PhysMapper};
use log::{debug, info, warn};

/// End of a free list.
const NIL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameAllocError {
    #[error("out of physical memory")]
    OutOfMemory,
}

/// One core's free list.
#[derive(Debug)]
struct Shard {
    head: u32,
    len: usize,
}

impl Shard {
    const EMPTY: Self = Self { head: NIL, len: 0 };
}

/// Hands out the frames of one contiguous physical range.
///
/// Every frame is either allocated or on exactly one shard's list. Lists
/// are LIFO: a frame freed on a core is the next one that core gets back.
pub struct FrameAllocator<'m, M: PhysMapper, C: Cpu> {
    memory: &'m M,
    cpu: C,
    first: PhysicalPage,
    /// `links[i]` is the index of the frame after frame `i` on its list.
    links: Box<[AtomicU32]>,
    shards: Box<[SpinLock<Shard>]>,
}

impl<'m, M: PhysMapper, C: Cpu> FrameAllocator<'m, M, C> {
    /// Manage every whole frame in `[round_up(start), end)` with one shard
    /// per core.
    ///
    /// All frames start out on shard 0 and are filled with the free junk
    /// pattern; the lowest frame is handed out last.
    ///
    /// # Panics
    /// If `cpus` is not in `1..=NCPU` or the range holds more frames than
    /// a link can index.
    pub fn new(
        memory: &'m M,
        cpu: C,
        start: PhysicalAddress,
        end: PhysicalAddress,
        cpus: usize,
    ) -> Self {
        #![allow(clippy::cast_possible_truncation)]
        assert!((1..=NCPU).contains(&cpus), "frame allocator: bad core count {cpus}");

        let first = start.page_round_up().page();
        let last = page_round_down(end.as_u64()) / PAGE_SIZE;
        let count = last.saturating_sub(first.number());
        assert!(count < u64::from(NIL), "frame allocator: {count} frames");

        let links: Box<[AtomicU32]> = (0..count as u32)
            .map(|i| AtomicU32::new(i.checked_sub(1).unwrap_or(NIL)))
            .collect();
        let shards: Box<[SpinLock<Shard>]> =
            (0..cpus).map(|_| SpinLock::new(Shard::EMPTY)).collect();

        let this = Self {
            memory,
            cpu,
            first,
            links,
            shards,
        };
        for index in 0..this.links.len() {
            this.fill(this.page(index), FREE_JUNK);
        }
        *this.shards[0].lock() = Shard {
            head: this.links.len().checked_sub(1).map_or(NIL, |top| top as u32),
            len: this.links.len(),
        };

        info!(
            "frame allocator: {count} frames from {:?}, {cpus} shards",
            first.base()
        );
        this
    }

    /// Number of frames under management.
    #[inline]
    #[must_use]
    pub fn total_frames(&self) -> usize {
        self.links.len()
    }

    /// First managed address and the end of the managed range.
    #[must_use]
    pub fn range(&self) -> (PhysicalAddress, PhysicalAddress) {
        (self.first.base(), self.page(self.links.len()).base())
    }

    /// Take a frame, preferring the calling core's shard.
    ///
    /// When the own shard is empty, one frame is taken from the first
    /// other shard that has any; the rest of that shard stays where it is.
    /// The frame comes back filled with the allocation junk pattern.
    pub fn allocate(&self) -> Option<PhysicalPage> {
        let pinned = PreemptGuard::new(&self.cpu);
        let own = self.shard_of(pinned.id());

        let index = self.pop(own).or_else(|| {
            (0..self.shards.len())
                .filter(|&i| i != own)
                .find_map(|victim| {
                    let index = self.pop(victim)?;
                    debug!("allocate: core {} took a frame from shard {victim}", pinned.id());
                    Some(index)
                })
        });
        drop(pinned);

        let Some(index) = index else {
            warn!("allocate: out of physical memory");
            return None;
        };
        let page = self.page(index);
        self.fill(page, ALLOC_JUNK);
        Some(page)
    }

    /// [`FrameAllocator::allocate`] for callers that propagate errors.
    ///
    /// # Errors
    /// [`FrameAllocError::OutOfMemory`] when no shard has a free frame.
    pub fn try_allocate(&self) -> Result<PhysicalPage, FrameAllocError> {
        self.allocate().ok_or(FrameAllocError::OutOfMemory)
    }

    /// Return the frame at `pa` to the calling core's shard.
    ///
    /// # Panics
    /// If `pa` is not page aligned or not a managed frame.
    pub fn free(&self, pa: PhysicalAddress) {
        assert!(pa.is_page_aligned(), "free: {pa:?} not page aligned");
        let (start, end) = self.range();
        assert!(
            start <= pa && pa < end,
            "free: {pa:?} outside {start:?}..{end:?}"
        );

        let page = pa.page();
        self.fill(page, FREE_JUNK);

        #[allow(clippy::cast_possible_truncation)]
        let index = (page.number() - self.first.number()) as u32;
        let pinned = PreemptGuard::new(&self.cpu);
        let mut shard = self.shards[self.shard_of(pinned.id())].lock();
        self.links[index as usize].store(shard.head, Ordering::Relaxed);
        shard.head = index;
        shard.len += 1;
    }

    /// Free frames on all shards together.
    pub fn free_frames(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len).sum()
    }

    /// Free frames on shard `shard`.
    ///
    /// # Panics
    /// If there is no such shard.
    pub fn shard_len(&self, shard: usize) -> usize {
        self.shards[shard].lock().len
    }

    /// Addresses on each shard's list, head first.
    pub fn snapshot(&self) -> Vec<Vec<PhysicalPage>> {
        self.shards
            .iter()
            .map(|shard| {
                let shard = shard.lock();
                let mut pages = Vec::with_capacity(shard.len);
                let mut index = shard.head;
                while index != NIL {
                    pages.push(self.page(index as usize));
                    index = self.links[index as usize].load(Ordering::Relaxed);
                }
                pages
            })
            .collect()
    }

    fn shard_of(&self, core: usize) -> usize {
        assert!(core < self.shards.len(), "frame allocator: no shard for core {core}");
        core
    }

    fn pop(&self, shard: usize) -> Option<usize> {
        let mut shard = self.shards[shard].lock();
        if shard.head == NIL {
            return None;
        }
        let index = shard.head as usize;
        shard.head = self.links[index].load(Ordering::Relaxed);
        shard.len -= 1;
        Some(index)
    }

    #[inline]
    const fn page(&self, index: usize) -> PhysicalPage {
        PhysicalPage::from_number(self.first.number() + index as u64)
    }

    fn fill(&self, page: PhysicalPage, junk: u8) {
        // SAFETY: managed frames are backed by `memory` and owned by us here.
        unsafe { self.memory.frame_bytes(page) }.fill(junk);
    }
}

impl<M: PhysMapper, C: Cpu> FrameAlloc for FrameAllocator<'_, M, C> {
    #[inline]
    fn alloc_4k(&self) -> Option<PhysicalPage> {
        self.allocate()
    }

    #[inline]
    fn free_4k(&self, page: PhysicalPage) {
        self.free(page.base());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PhysicalMemory;
    use core::cell::Cell;
    use kernel_sync::UniCore;

    /// A machine whose current core is chosen by the test.
    #[derive(Default)]
    struct Switchable {
        core: std::sync::atomic::AtomicUsize,
    }

    impl Switchable {
        fn switch_to(&self, core: usize) {
            self.core.store(core, Ordering::Relaxed);
        }
    }

    impl Cpu for Switchable {
        fn id(&self) -> usize {
            self.core.load(Ordering::Relaxed)
        }
        fn push_off(&self) {}
        fn pop_off(&self) {}
    }

    fn ram(frames: usize) -> PhysicalMemory {
        PhysicalMemory::new(PhysicalAddress::new(0x8800_0000), frames)
    }

    #[test]
    fn range_is_rounded_to_whole_frames() {
        let ram = ram(8);
        let frames = FrameAllocator::new(
            &ram,
            UniCore::new(),
            ram.start() + 1,
            ram.end() + 0x800,
            1,
        );
        assert_eq!(frames.total_frames(), 7);
        assert_eq!(frames.range(), (ram.start() + PAGE_SIZE, ram.end()));
    }

    #[test]
    fn frames_come_out_highest_first() {
        let ram = ram(4);
        let frames = FrameAllocator::new(&ram, UniCore::new(), ram.start(), ram.end(), 1);
        let order: Vec<_> = core::iter::from_fn(|| frames.allocate()).collect();
        let expected: Vec<_> = (0..4)
            .rev()
            .map(|i| (ram.start() + i * PAGE_SIZE).page())
            .collect();
        assert_eq!(order, expected);
        assert_eq!(frames.allocate(), None);
        assert_eq!(frames.try_allocate(), Err(FrameAllocError::OutOfMemory));
    }

    #[test]
    fn junk_marks_allocated_and_freed_frames() {
        let ram = ram(2);
        let frames = FrameAllocator::new(&ram, UniCore::new(), ram.start(), ram.end(), 1);
        assert!(ram.read(ram.start().page()).iter().all(|&b| b == FREE_JUNK));

        let page = frames.allocate().unwrap();
        assert!(ram.read(page).iter().all(|&b| b == ALLOC_JUNK));
        frames.free(page.base());
        assert!(ram.read(page).iter().all(|&b| b == FREE_JUNK));
    }

    #[test]
    fn frees_go_to_the_freeing_core() {
        let ram = ram(4);
        let cpu = Switchable::default();
        let frames = FrameAllocator::new(&ram, &cpu, ram.start(), ram.end(), 3);
        assert_eq!(frames.shard_len(0), 4);

        let page = frames.allocate().unwrap();
        cpu.switch_to(2);
        frames.free(page.base());
        assert_eq!(
            (frames.shard_len(0), frames.shard_len(1), frames.shard_len(2)),
            (3, 0, 1)
        );
        assert_eq!(frames.snapshot()[2], vec![page]);
    }

    #[test]
    fn empty_shard_steals_one_frame() {
        let ram = ram(4);
        let cpu = Switchable::default();
        let frames = FrameAllocator::new(&ram, &cpu, ram.start(), ram.end(), 2);

        cpu.switch_to(1);
        let stolen = frames.allocate().unwrap();
        assert_eq!(stolen, (ram.start() + 3 * PAGE_SIZE).page());
        // The rest of shard 0 stays put.
        assert_eq!((frames.shard_len(0), frames.shard_len(1)), (3, 0));

        frames.free(stolen.base());
        assert_eq!((frames.shard_len(0), frames.shard_len(1)), (3, 1));
        assert_eq!(frames.allocate(), Some(stolen));
    }

    #[test]
    #[should_panic(expected = "free: PA(0x88000800) not page aligned")]
    fn unaligned_free_is_fatal() {
        let ram = ram(2);
        let frames = FrameAllocator::new(&ram, UniCore::new(), ram.start(), ram.end(), 1);
        frames.free(ram.start() + 0x800);
    }

    #[test]
    #[should_panic(expected = "free: PA(0x88002000) outside PA(0x88000000)..PA(0x88002000)")]
    fn foreign_free_is_fatal() {
        let ram = ram(2);
        let frames = FrameAllocator::new(&ram, UniCore::new(), ram.start(), ram.end(), 1);
        frames.free(ram.end());
    }

    #[test]
    #[should_panic(expected = "frame allocator: no shard for core 3")]
    fn cores_need_a_shard() {
        let ram = ram(2);
        let cpu = Switchable::default();
        let frames = FrameAllocator::new(&ram, &cpu, ram.start(), ram.end(), 2);
        cpu.switch_to(3);
        let _ = frames.allocate();
    }

    #[test]
    fn allocation_is_pinned() {
        thread_local!(static DEPTH: Cell<usize> = const { Cell::new(0) });

        struct Checked;
        impl Cpu for Checked {
            fn id(&self) -> usize {
                assert!(DEPTH.get() > 0, "core id read while unpinned");
                0
            }
            fn push_off(&self) {
                DEPTH.set(DEPTH.get() + 1);
            }
            fn pop_off(&self) {
                DEPTH.set(DEPTH.get() - 1);
            }
        }

        let ram = ram(2);
        let frames = FrameAllocator::new(&ram, Checked, ram.start(), ram.end(), 1);
        let page = frames.allocate().unwrap();
        frames.free(page.base());
        assert_eq!(DEPTH.get(), 0);
    }
}
