//! # Reaching physical frames
//!
//! The page-table code only ever holds physical addresses; a [`PhysMapper`]
//! turns them into references it can read and write.
//!
//! - [`DirectMap`] is what the kernel uses: RAM is mapped at its physical
//!   address in the kernel view, so the conversion is the identity.
//! - [`PhysicalMemory`] owns a run of frames on the heap and pretends they
//!   sit at a chosen physical address. Hosted tests run the allocator and
//!   the page-table code on top of it.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::PhysicalMemory;
//! use kernel_vmem::{PageTable, PhysMapper, PhysicalAddress};
//!
//! let ram = PhysicalMemory::new(PhysicalAddress::new(0x8000_0000), 2);
//! unsafe {
//!     let table: &mut PageTable = ram.phys_to_mut(PhysicalAddress::new(0x8000_1000));
//!     table.zero();
//! }
//! assert!(ram.read(ram.start().page().next()).iter().all(|&b| b == 0));
//! ```

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage};
use kernel_vmem::{FrameBytes, PhysMapper};

/// [`PhysMapper`] for a kernel running with RAM direct-mapped.
///
/// # Safety
/// Only valid while the active page table maps every referenced physical
/// address at the same virtual address.
#[derive(Debug, Default, Copy, Clone)]
pub struct DirectMap;

impl PhysMapper for DirectMap {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = pa.as_u64() as *mut T;
        // SAFETY: Caller must ensure the physical address is valid and direct-mapped.
        unsafe { &mut *va }
    }
}

#[repr(C, align(4096))]
struct Frame(FrameBytes);

/// Heap-backed frames standing in for physical memory at `start`.
pub struct PhysicalMemory {
    start: PhysicalAddress,
    frames: Box<[UnsafeCell<Frame>]>,
}

// SAFETY: frames are handed out by a frame allocator, one owner at a time.
unsafe impl Sync for PhysicalMemory {}

impl PhysicalMemory {
    /// `frames` zeroed frames starting at the page-aligned `start`.
    ///
    /// # Panics
    /// If `start` is not page aligned.
    #[must_use]
    pub fn new(start: PhysicalAddress, frames: usize) -> Self {
        assert!(start.is_page_aligned(), "physical memory: {start:?} not page aligned");
        Self {
            start,
            frames: (0..frames)
                .map(|_| UnsafeCell::new(Frame([0; PAGE_SIZE as usize])))
                .collect(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        self.start
    }

    /// First address past the arena.
    #[inline]
    #[must_use]
    pub fn end(&self) -> PhysicalAddress {
        self.start + self.frames.len() as u64 * PAGE_SIZE
    }

    #[must_use]
    pub fn contains(&self, pa: PhysicalAddress) -> bool {
        self.start <= pa && pa < self.end()
    }

    /// Copy of the bytes of frame `page`.
    ///
    /// # Panics
    /// If `page` is not part of the arena.
    #[must_use]
    pub fn read(&self, page: PhysicalPage) -> Vec<u8> {
        // SAFETY: read-only snapshot; the caller owns the frame.
        unsafe { self.frame_bytes(page) }.to_vec()
    }
}

impl PhysMapper for PhysicalMemory {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        assert!(self.contains(pa), "physical memory: {pa:?} out of range");
        let offset = pa.as_u64() - self.start.as_u64();
        #[allow(clippy::cast_possible_truncation)]
        let (index, within) = ((offset / PAGE_SIZE) as usize, (offset % PAGE_SIZE) as usize);
        assert!(
            within + size_of::<T>() <= PAGE_SIZE as usize,
            "physical memory: {pa:?} crosses a frame"
        );
        let frame = self.frames[index].get().cast::<u8>();
        // SAFETY: in bounds of one frame; the caller vouches for type and aliasing.
        unsafe { &mut *frame.add(within).cast::<T>() }
    }
}
