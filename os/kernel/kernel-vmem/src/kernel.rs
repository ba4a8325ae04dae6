//! # Kernel address spaces
//!
//! The kernel runs with RAM and the device windows direct-mapped
//! (virtual = physical) and the trampoline page at the top of the address
//! space.
//!
//! ```text
//!   TRAMPOLINE  ─────────▶ trampoline frame        R X
//!   ...
//!   text_end .. PHYSTOP  ─▶ kernel data + free RAM  R W
//!   KERNBASE .. text_end ─▶ kernel text             R X
//!   PLIC  (4 MiB)                                   R W
//!   VIRTIO0, UART0 (one page each)                  R W
//!   CLINT (64 KiB, global table only)               R W
//! ```
//!
//! Every process additionally owns a private copy of this view, without
//! the CLINT window, into which its user pages are mirrored
//! (see [`crate::mirror`]).

use crate::mirror::release_mirror;
use crate::{AddressSpace, FrameAlloc, PagePermissions, PhysMapper, VmError};
use kernel_info::memory::{
    CLINT, CLINT_SIZE, KERNBASE, PAGE_SIZE, PHYSTOP, PLIC, PLIC_SIZE, TRAMPOLINE, UART0, VIRTIO0,
};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};
use log::{debug, info};

/// Where the loaded kernel image sits in physical memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct KernelImage {
    /// First byte after the kernel text (page aligned).
    pub text_end: PhysicalAddress,
    /// Frame holding the trap trampoline code.
    pub trampoline: PhysicalPage,
}

/// One contiguous mapping of a kernel view.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Region {
    pub va: VirtualAddress,
    pub pa: PhysicalAddress,
    pub size: u64,
    pub perm: PagePermissions,
}

impl Region {
    const fn direct(base: u64, size: u64, perm: PagePermissions) -> Self {
        Self {
            va: VirtualAddress::new(base),
            pa: PhysicalAddress::new(base),
            size,
            perm,
        }
    }
}

/// The mappings making up a kernel view, lowest address first.
///
/// # Panics
/// If `image.text_end` is unaligned or not strictly inside
/// `(KERNBASE, PHYSTOP)`.
#[must_use]
pub fn kernel_regions(image: &KernelImage, with_clint: bool) -> ([Region; 7], usize) {
    let text_end = image.text_end.as_u64();
    assert!(
        image.text_end.is_page_aligned() && KERNBASE < text_end && text_end < PHYSTOP,
        "kernel image: text end {:?} outside (KERNBASE, PHYSTOP)",
        image.text_end
    );

    let rw = PagePermissions::READ_WRITE;
    let rx = PagePermissions::READ_EXECUTE;
    let trampoline = Region {
        va: VirtualAddress::new(TRAMPOLINE),
        pa: image.trampoline.base(),
        size: PAGE_SIZE,
        perm: rx,
    };

    let mut regions = [trampoline; 7];
    let mut n = 0;
    let mut push = |region| {
        regions[n] = region;
        n += 1;
    };
    if with_clint {
        push(Region::direct(CLINT, CLINT_SIZE, rw));
    }
    push(Region::direct(PLIC, PLIC_SIZE, rw));
    push(Region::direct(UART0, PAGE_SIZE, rw));
    push(Region::direct(VIRTIO0, PAGE_SIZE, rw));
    push(Region::direct(KERNBASE, text_end - KERNBASE, rx));
    push(Region::direct(text_end, PHYSTOP - text_end, rw));
    push(trampoline);
    (regions, n)
}

/// Build the global kernel table used while no process is running.
///
/// # Panics
/// If memory runs out or the image layout is invalid.
pub fn make_kernel_table<'m, M: PhysMapper, A: FrameAlloc + ?Sized>(
    mapper: &'m M,
    alloc: &A,
    image: &KernelImage,
) -> AddressSpace<'m, M> {
    let Ok(space) = AddressSpace::create(mapper, alloc) else {
        panic!("make_kernel_table: out of memory");
    };

    let (regions, n) = kernel_regions(image, true);
    for r in &regions[..n] {
        space.kernel_map(alloc, r.va, r.pa, r.size, r.perm);
    }

    info!(
        "kernel table {:?}: text ends at {:?}, trampoline in {:?}",
        space.root_page(),
        image.text_end,
        image.trampoline
    );
    space
}

/// Build a process's private kernel view.
///
/// The CLINT window is left out so that user memory below `PLIC` can be
/// mirrored into the same table without colliding with kernel mappings.
///
/// # Errors
/// [`VmError::OutOfMemory`]; the partial table has been freed by then.
pub fn make_process_kernel_table<'m, M: PhysMapper, A: FrameAlloc + ?Sized>(
    mapper: &'m M,
    alloc: &A,
    image: &KernelImage,
) -> Result<AddressSpace<'m, M>, VmError> {
    let space = AddressSpace::create(mapper, alloc)?;

    let (regions, n) = kernel_regions(image, false);
    for r in &regions[..n] {
        if let Err(e) = space.map_range(alloc, r.va, r.pa, r.size, r.perm) {
            debug!("process kernel table: {e} mapping {:?}", r.va);
            release_mirror(space, alloc);
            return Err(e);
        }
    }
    Ok(space)
}
