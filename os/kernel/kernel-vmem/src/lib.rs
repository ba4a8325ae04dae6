//! # Virtual Memory Support
//!
//! RISC-V Sv39 page tables for a small multiprocessor kernel.
//!
//! ## What you get
//! - An [`AddressSpace`] handle over a 3-level translation tree, with
//!   map/unmap/translate, duplication, user copy helpers and teardown.
//! - The raw Sv39 [`PageEntry`] bitfield and the 512-slot [`PageTable`].
//! - [`PagePermissions`] for leaf mappings.
//! - The direct-mapped kernel view ([`kernel`]) and the per-process kernel
//!   mirror of user memory ([`mirror`], [`ProcessMemory`]).
//! - A tiny allocator/mapper interface ([`FrameAlloc`], [`PhysMapper`]).
//!
//! ## Sv39 Virtual Address → Physical Address Walk
//!
//! A 39-bit virtual address is divided into four fields:
//!
//! ```text
//! | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  L2   |  L1   |  L0   | Offset |
//! ```
//!
//! Each level indexes a 4 KiB table of 512 eight-byte entries:
//!
//! ```text
//!  root (L2)  →  L1  →  L0  →  4 KiB physical page
//! ```
//!
//! ### Leaf vs. non-leaf entries
//!
//! - A **leaf entry** has at least one of `R`, `W`, `X` and maps a page.
//!   Only level-0 entries are ever leaves here; larger pages are not used.
//! - A **non-leaf entry** is valid with `R = W = X = 0` and names the next
//!   table. It never carries permission bits.
//!
//! Addresses at or above [`MAXVA`](kernel_info::memory::MAXVA) are never
//! walked; one bit of the Sv39 range is left unused so that no address
//! needs sign extension.
//!
//! ## Ownership
//!
//! The tree is not internally locked. Callers serialize all mutation of a
//! given address space; distinct address spaces may be used concurrently as
//! long as the [`FrameAlloc`] they share is thread safe.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod address_space;
mod error;
pub mod kernel;
pub mod mirror;
mod page_entry;
mod page_table;
mod permissions;
mod process;

#[cfg(test)]
mod test_support;

pub use crate::address_space::AddressSpace;
pub use crate::error::VmError;
pub use crate::page_entry::PageEntry;
pub use crate::page_table::{PageTable, table_index};
pub use crate::permissions::PagePermissions;
pub use crate::process::ProcessMemory;
pub use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

/// The bytes of one physical frame.
pub type FrameBytes = [u8; info::PAGE_SIZE as usize];

/// Source of **physical** 4 KiB frames for table nodes and user memory.
///
/// Implementations must be usable through a shared reference; the kernel's
/// allocator is shared by every core. Returned frames must be page aligned
/// and may hold arbitrary content.
pub trait FrameAlloc {
    /// Allocate one 4 KiB frame, or `None` when memory is exhausted.
    fn alloc_4k(&self) -> Option<PhysicalPage>;

    /// Return a frame obtained from [`FrameAlloc::alloc_4k`].
    fn free_4k(&self, page: PhysicalPage);
}

impl<A: FrameAlloc + ?Sized> FrameAlloc for &A {
    #[inline]
    fn alloc_4k(&self) -> Option<PhysicalPage> {
        (**self).alloc_4k()
    }

    #[inline]
    fn free_4k(&self, page: PhysicalPage) {
        (**self).free_4k(page);
    }
}

/// Converts physical addresses to usable references in the current
/// address space (the kernel direct-maps all of RAM).
///
/// # Safety
/// - `pa` must be backed by memory that stays valid for `'a`.
/// - Type `T` must match the bytes at `pa`, be suitably aligned, and no
///   other live reference may alias the returned one.
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// See the trait documentation.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;

    /// The bytes of the frame `page`.
    ///
    /// # Safety
    /// See the trait documentation.
    #[inline]
    unsafe fn frame_bytes<'a>(&self, page: PhysicalPage) -> &'a mut FrameBytes {
        unsafe { self.phys_to_mut::<FrameBytes>(page.base()) }
    }
}

/// Zero-fill a fresh frame.
#[inline]
pub(crate) fn zero_frame<M: PhysMapper>(mapper: &M, page: PhysicalPage) {
    // SAFETY: the frame was just handed to us by the allocator.
    unsafe { mapper.frame_bytes(page) }.fill(0);
}
