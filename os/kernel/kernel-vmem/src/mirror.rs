//! Replicating user mappings into a process's private kernel table.
//!
//! While handling a trap the kernel keeps running on the process's own
//! kernel view, so it can dereference user pointers directly. Every user
//! leaf in `[0, size)` therefore has a twin in the kernel view that points
//! at the same frame with the user bit cleared. The user table owns the
//! frames; the kernel view only borrows them.

use crate::address_space::Leaves;
use crate::{AddressSpace, FrameAlloc, PageEntry, PhysMapper, VmError};
use kernel_info::memory::{PAGE_SIZE, PAGE_TABLE_LEVELS, PLIC};
use kernel_memory_addresses::{VirtualAddress, page_round_up};
use log::trace;

/// Copy the user leaves for `[round_up(old_size), new_size)` into `kernel`,
/// clearing their user bit.
///
/// A `new_size` at or below `old_size` mirrors nothing.
///
/// # Errors
/// - [`VmError::MirrorOverlapsKernel`] if `new_size` reaches `PLIC`.
/// - [`VmError::OutOfMemory`] if a kernel-side table cannot be allocated;
///   the entries mirrored by this call have been cleared again.
///
/// # Panics
/// If a user page in the range is not mapped, or the kernel view already
/// maps one of the addresses.
pub fn mirror_kernel_range<M: PhysMapper, A: FrameAlloc + ?Sized>(
    user: &AddressSpace<'_, M>,
    kernel: &AddressSpace<'_, M>,
    alloc: &A,
    old_size: u64,
    new_size: u64,
) -> Result<(), VmError> {
    if new_size <= old_size {
        return Ok(());
    }
    if new_size > PLIC {
        return Err(VmError::MirrorOverlapsKernel { end: new_size });
    }

    let start = page_round_up(old_size);
    let mut va = start;
    while va < new_size {
        let addr = VirtualAddress::new(va);
        let src = match user.lookup(addr) {
            Some(slot) if slot.is_leaf() => *slot,
            _ => panic!("mirror_kernel_range: user {addr:?} not mapped"),
        };

        let Some(slot) = kernel.walk(alloc, addr, true) else {
            kernel.unmap_leaves::<A>(VirtualAddress::new(start), (va - start) / PAGE_SIZE, None);
            return Err(VmError::OutOfMemory);
        };
        assert!(!slot.is_valid(), "mirror_kernel_range: remap at {addr:?}");
        *slot = src.with_user(false);
        va += PAGE_SIZE;
    }

    trace!(
        "mirror: {:#x}..{new_size:#x} into {:?}",
        start,
        kernel.root_page()
    );
    Ok(())
}

/// Clear the mirrored leaves for `[round_up(new_size), round_up(old_size))`
/// without freeing their frames.
///
/// A `new_size` at or above `old_size` clears nothing.
///
/// # Panics
/// If a page in the range is not mirrored.
pub fn unmirror_kernel_range<M: PhysMapper>(
    kernel: &AddressSpace<'_, M>,
    old_size: u64,
    new_size: u64,
) {
    let (keep, end) = (page_round_up(new_size), page_round_up(old_size));
    if keep < end {
        kernel.unmap_leaves::<dyn FrameAlloc>(
            VirtualAddress::new(keep),
            (end - keep) / PAGE_SIZE,
            None,
        );
    }
}

/// Tear down a process kernel view: clear every leaf, keeping its frame,
/// and free every table node.
pub fn release_mirror<M: PhysMapper, A: FrameAlloc + ?Sized>(
    kernel: AddressSpace<'_, M>,
    alloc: &A,
) {
    kernel.free_nodes(kernel.root_page(), PAGE_TABLE_LEVELS - 1, alloc, Leaves::Forget);
}

/// Whether `entry` mirrors `user` (same frame and flags, user bit cleared).
#[must_use]
pub fn is_mirror_of(entry: PageEntry, user: PageEntry) -> bool {
    user.is_leaf() && entry == user.with_user(false)
}
