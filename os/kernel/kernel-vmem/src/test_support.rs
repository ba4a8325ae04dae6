//! Hosted doubles for the address-space tests: a small frame arena that is
//! both the physical memory and its allocator.

use crate::{FrameAlloc, PhysMapper};
use core::cell::{Cell, RefCell, UnsafeCell};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage};

#[repr(C, align(4096))]
struct Frame([u8; PAGE_SIZE as usize]);

pub struct TestMemory {
    base: u64,
    frames: Box<[UnsafeCell<Frame>]>,
    free: RefCell<Vec<PhysicalPage>>,
    outstanding: Cell<usize>,
}

impl TestMemory {
    /// Physical address of the first arena frame.
    pub const BASE: u64 = 0x8700_0000;

    pub fn new(frames: usize) -> Self {
        let base = Self::BASE;
        Self {
            base,
            frames: (0..frames)
                .map(|_| UnsafeCell::new(Frame([0xAA; PAGE_SIZE as usize])))
                .collect(),
            // Lowest address on top so allocation order is ascending.
            free: RefCell::new(
                (0..frames as u64)
                    .rev()
                    .map(|i| PhysicalPage::from_number(base / PAGE_SIZE + i))
                    .collect(),
            ),
            outstanding: Cell::new(0),
        }
    }

    /// Frames handed out and not yet returned.
    pub fn outstanding(&self) -> usize {
        self.outstanding.get()
    }

    pub fn available(&self) -> usize {
        self.free.borrow().len()
    }

    /// Copy of the frame's bytes.
    pub fn read_frame(&self, page: PhysicalPage) -> Vec<u8> {
        // SAFETY: test frames live as long as `self`.
        unsafe { self.frame_bytes(page) }.to_vec()
    }

    fn contains(&self, page: PhysicalPage) -> bool {
        let first = self.base / PAGE_SIZE;
        (first..first + self.frames.len() as u64).contains(&page.number())
    }
}

impl PhysMapper for TestMemory {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let offset = pa
            .as_u64()
            .checked_sub(self.base)
            .unwrap_or_else(|| panic!("{pa:?} below test memory"));
        let index = (offset / PAGE_SIZE) as usize;
        let within = (offset % PAGE_SIZE) as usize;
        assert!(within + size_of::<T>() <= PAGE_SIZE as usize);
        let frame = self.frames[index].get().cast::<u8>();
        // SAFETY: in bounds of one frame; the caller vouches for type and aliasing.
        unsafe { &mut *frame.add(within).cast::<T>() }
    }
}

impl FrameAlloc for TestMemory {
    fn alloc_4k(&self) -> Option<PhysicalPage> {
        let page = self.free.borrow_mut().pop()?;
        self.outstanding.set(self.outstanding.get() + 1);
        Some(page)
    }

    fn free_4k(&self, page: PhysicalPage) {
        assert!(self.contains(page), "free of foreign frame {page:?}");
        let mut free = self.free.borrow_mut();
        assert!(!free.contains(&page), "double free of {page:?}");
        free.push(page);
        self.outstanding.set(self.outstanding.get() - 1);
    }
}
