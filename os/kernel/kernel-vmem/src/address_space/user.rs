//! User image management: the first process image, growing and shrinking
//! the heap, fork-style duplication and teardown.

use super::AddressSpace;
use crate::{FrameAlloc, PagePermissions, PhysMapper, VmError, zero_frame};
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{VirtualAddress, page_round_up, pages_for};
use log::{debug, warn};

impl<M: PhysMapper> AddressSpace<'_, M> {
    /// Map one zeroed user page at address zero holding `image`.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if no frame is left.
    ///
    /// # Panics
    /// If `image` does not fit in less than a page.
    pub fn load_first<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &A,
        image: &[u8],
    ) -> Result<(), VmError> {
        assert!(
            (image.len() as u64) < PAGE_SIZE,
            "load_first: image of {} bytes exceeds a page",
            image.len()
        );

        let frame = alloc.alloc_4k().ok_or(VmError::OutOfMemory)?;
        // SAFETY: fresh frame from the allocator.
        let bytes = unsafe { self.mapper.frame_bytes(frame) };
        bytes.fill(0);
        bytes[..image.len()].copy_from_slice(image);

        self.map_range(
            alloc,
            VirtualAddress::zero(),
            frame.base(),
            PAGE_SIZE,
            PagePermissions::USER_RWX,
        )
        .inspect_err(|_| alloc.free_4k(frame))
    }

    /// Grow user memory from `old_size` to `new_size` bytes with zeroed,
    /// eagerly allocated pages. Returns the new size.
    ///
    /// Sizes need not be aligned. A `new_size` below `old_size` is a no-op.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`]; everything added by this call has been
    /// unmapped and freed again by then.
    pub fn grow<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &A,
        old_size: u64,
        new_size: u64,
    ) -> Result<u64, VmError> {
        if new_size < old_size {
            return Ok(old_size);
        }

        let mut va = page_round_up(old_size);
        while va < new_size {
            let Some(frame) = alloc.alloc_4k() else {
                warn!("grow: out of memory at {va:#x}, unwinding to {old_size:#x}");
                self.shrink(alloc, va, old_size);
                return Err(VmError::OutOfMemory);
            };
            zero_frame(self.mapper, frame);

            let mapped = self.map_range(
                alloc,
                VirtualAddress::new(va),
                frame.base(),
                PAGE_SIZE,
                PagePermissions::USER_RWX,
            );
            if let Err(e) = mapped {
                alloc.free_4k(frame);
                self.shrink(alloc, va, old_size);
                return Err(e);
            }
            va += PAGE_SIZE;
        }
        Ok(new_size)
    }

    /// Shrink user memory from `old_size` to `new_size` bytes, freeing the
    /// whole pages that are no longer covered. Returns the new size.
    ///
    /// A `new_size` at or above `old_size` is a no-op.
    pub fn shrink<A: FrameAlloc + ?Sized>(&self, alloc: &A, old_size: u64, new_size: u64) -> u64 {
        if new_size >= old_size {
            return old_size;
        }

        let (keep, end) = (page_round_up(new_size), page_round_up(old_size));
        if keep < end {
            self.unmap_range(
                alloc,
                VirtualAddress::new(keep),
                (end - keep) / PAGE_SIZE,
                true,
            );
        }
        new_size
    }

    /// Revoke user access to the page at `va`, e.g. for a stack guard page.
    ///
    /// # Panics
    /// If no level-0 slot exists for `va`.
    pub fn clear_user(&self, va: VirtualAddress) {
        let Some(slot) = self.lookup(va) else {
            panic!("clear_user: no slot for {va:?}");
        };
        slot.set_user(false);
    }

    /// Unmap and free the first `size` bytes of user memory, then every
    /// table node.
    pub fn free_user<A: FrameAlloc + ?Sized>(self, alloc: &A, size: u64) {
        if size > 0 {
            self.unmap_range(alloc, VirtualAddress::zero(), pages_for(size), true);
        }
        self.free_tree(alloc);
    }

    /// Copy the first `size` bytes of this address space into `dst`, page by
    /// page into fresh frames with identical permissions.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`]; whatever was already copied into `dst` has
    /// been unmapped and freed again by then.
    ///
    /// # Panics
    /// If a page below `size` is not mapped in this address space.
    pub fn duplicate<A: FrameAlloc + ?Sized>(
        &self,
        dst: &AddressSpace<'_, M>,
        alloc: &A,
        size: u64,
    ) -> Result<(), VmError> {
        let mut va = 0;
        while va < size {
            let addr = VirtualAddress::new(va);
            let src = match self.lookup(addr) {
                Some(slot) if slot.is_valid() => *slot,
                Some(_) => panic!("duplicate: {addr:?} not present"),
                None => panic!("duplicate: no table for {addr:?}"),
            };

            let copied = alloc
                .alloc_4k()
                .ok_or(VmError::OutOfMemory)
                .and_then(|frame| {
                    // SAFETY: distinct frames; `frame` is fresh, `src` stays mapped.
                    unsafe {
                        *self.mapper.frame_bytes(frame) = *self.mapper.frame_bytes(src.page());
                    }
                    dst.map_range(alloc, addr, frame.base(), PAGE_SIZE, src.permissions())
                        .inspect_err(|_| alloc.free_4k(frame))
                });

            if let Err(e) = copied {
                warn!("duplicate: {e} at {addr:?}, unwinding");
                dst.unmap_range(alloc, VirtualAddress::zero(), va / PAGE_SIZE, true);
                return Err(e);
            }
            va += PAGE_SIZE;
        }

        debug!("duplicate: {} pages into {:?}", va / PAGE_SIZE, dst.root);
        Ok(())
    }
}
