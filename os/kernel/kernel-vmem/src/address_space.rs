//! # Address Space (Sv39, 3-level)
//!
//! A handle over one translation tree, identified by the physical page of
//! its root table.
//!
//! ## Highlights
//!
//! - [`AddressSpace::walk`] descends the three levels, optionally creating
//!   missing tables, and yields the level-0 slot for an address.
//! - [`AddressSpace::map_range`] / [`AddressSpace::unmap_range`] install and
//!   remove leaves. Remapping a valid slot and unmapping an absent one are
//!   contract violations and panic.
//! - [`AddressSpace::free_tree`] releases every table node once all leaves
//!   are gone.
//! - User image management (`grow`, `shrink`, `duplicate`, ...) and the
//!   user copy helpers live in submodules.
//!
//! ## Leaf slot states
//!
//! ```text
//!   Absent ──map_range──▶ Mapped ──unmap_range──▶ Absent
//!                          │
//!                          └─map_range─▶ panic ("remap")
//! ```
//!
//! ## Safety
//!
//! - Table frames are reached through the [`PhysMapper`]; every frame in the
//!   tree must stay owned by it until [`AddressSpace::free_tree`].
//! - Mutating an active address space requires TLB maintenance by the caller.

mod copy;
mod user;

use crate::{FrameAlloc, PageEntry, PagePermissions, PageTable, PhysMapper, VmError, table_index};
use kernel_info::memory::{ENTRIES_PER_TABLE, MAXVA, PAGE_SIZE, PAGE_TABLE_LEVELS};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};
use log::{info, trace, warn};

/// `satp` MODE field selecting Sv39 translation.
const SATP_SV39: u64 = 8 << 60;

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalPage,
    mapper: &'m M,
}

/// What a teardown does with leaves it meets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Leaves {
    /// Leaves must already be gone.
    Forbid,
    /// Leaves are cleared; their frames belong to someone else.
    Forget,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Allocate an empty address space: a zeroed root table.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if no frame is available for the root.
    pub fn create<A: FrameAlloc + ?Sized>(mapper: &'m M, alloc: &A) -> Result<Self, VmError> {
        let root = alloc.alloc_4k().ok_or(VmError::OutOfMemory)?;
        crate::zero_frame(mapper, root);
        trace!("create: root {root:?}");
        Ok(Self { root, mapper })
    }

    /// Wrap an existing tree whose root table lives in `root`.
    #[inline]
    pub const fn from_root(mapper: &'m M, root: PhysicalPage) -> Self {
        Self { root, mapper }
    }

    /// Physical page of the root table.
    #[inline]
    pub const fn root_page(&self) -> PhysicalPage {
        self.root
    }

    #[inline]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    /// The `satp` register value that activates this address space.
    #[inline]
    pub const fn satp(&self) -> u64 {
        SATP_SV39 | self.root.number()
    }

    #[allow(clippy::mut_from_ref)]
    #[inline]
    fn table(&self, page: PhysicalPage) -> &mut PageTable {
        // SAFETY: table frames belong to this tree and are only reached through it.
        unsafe { self.mapper.phys_to_mut::<PageTable>(page.base()) }
    }

    /// Find the level-0 slot for `va`.
    ///
    /// Missing intermediate tables are allocated, zeroed and linked when
    /// `create` is set; otherwise (or when allocation fails) the walk yields
    /// `None`.
    ///
    /// # Panics
    /// If `va` is at or above [`MAXVA`].
    #[allow(clippy::mut_from_ref)]
    pub fn walk<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &A,
        va: VirtualAddress,
        create: bool,
    ) -> Option<&mut PageEntry> {
        self.descend(va, create.then_some(alloc))
    }

    /// Find the level-0 slot for `va` without creating tables.
    ///
    /// # Panics
    /// If `va` is at or above [`MAXVA`].
    #[allow(clippy::mut_from_ref)]
    pub fn lookup(&self, va: VirtualAddress) -> Option<&mut PageEntry> {
        self.descend::<dyn FrameAlloc>(va, None)
    }

    #[allow(clippy::mut_from_ref)]
    fn descend<A: FrameAlloc + ?Sized>(
        &self,
        va: VirtualAddress,
        alloc: Option<&A>,
    ) -> Option<&mut PageEntry> {
        assert!(va.as_u64() < MAXVA, "walk: {va:?} beyond MAXVA");

        let mut table = self.table(self.root);
        for level in (1..PAGE_TABLE_LEVELS).rev() {
            let slot = table.slot_mut(table_index(va, level));
            if !slot.is_valid() {
                let page = alloc?.alloc_4k()?;
                crate::zero_frame(self.mapper, page);
                *slot = PageEntry::table(page);
                trace!("walk: level {level} table {page:?} for {va:?}");
            }
            assert!(slot.is_table(), "walk: leaf at level {level} for {va:?}");
            table = self.table(slot.page());
        }
        Some(table.slot_mut(table_index(va, 0)))
    }

    /// Translate a user-accessible `va` (with its page offset).
    ///
    /// Yields `None` for addresses beyond [`MAXVA`], unmapped addresses and
    /// mappings without the user bit.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        if va.as_u64() >= MAXVA {
            return None;
        }
        let entry = *self.lookup(va)?;
        (entry.is_leaf() && entry.user()).then(|| entry.page().join(va.offset()))
    }

    /// Translate a kernel `va` that must be mapped, e.g. a kernel stack.
    ///
    /// # Panics
    /// If no leaf maps `va`.
    #[must_use]
    pub fn translate_kernel(&self, va: VirtualAddress) -> PhysicalAddress {
        let Some(entry) = self.lookup(va).map(|slot| *slot) else {
            panic!("translate_kernel: no table for {va:?}");
        };
        assert!(entry.is_leaf(), "translate_kernel: {va:?} not mapped");
        entry.page().join(va.offset())
    }

    /// Map `[va, va + size)` to `[pa, pa + size)` with `perm`.
    ///
    /// Both addresses and the size must be page aligned. If a table cannot
    /// be allocated, the pages mapped by this call are removed again and
    /// [`VmError::OutOfMemory`] is returned.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] when a table node cannot be allocated.
    ///
    /// # Panics
    /// On unaligned input, an empty range, permissions without any access
    /// bit, or when a target slot is already valid.
    pub fn map_range<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        size: u64,
        perm: PagePermissions,
    ) -> Result<(), VmError> {
        assert!(va.is_page_aligned(), "map_range: {va:?} not aligned");
        assert!(pa.is_page_aligned(), "map_range: {pa:?} not aligned");
        assert!(
            size != 0 && size.is_multiple_of(PAGE_SIZE),
            "map_range: bad size {size:#x} at {va:?}"
        );
        assert!(perm.has_access(), "map_range: no access bits for {va:?}");

        let pages = size / PAGE_SIZE;
        for i in 0..pages {
            let addr = va + i * PAGE_SIZE;
            let Some(slot) = self.walk(alloc, addr, true) else {
                warn!("map_range: out of memory at {addr:?}");
                self.unmap_leaves::<A>(va, i, None);
                return Err(VmError::OutOfMemory);
            };
            assert!(!slot.is_valid(), "map_range: remap at {addr:?}");
            *slot = PageEntry::leaf((pa + i * PAGE_SIZE).page(), perm);
        }

        trace!("map_range: {va:?} -> {pa:?}, {pages} pages, {perm:?}");
        Ok(())
    }

    /// Map a kernel range; failure is fatal.
    ///
    /// # Panics
    /// Like [`AddressSpace::map_range`], and when memory runs out.
    pub fn kernel_map<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        size: u64,
        perm: PagePermissions,
    ) {
        if self.map_range(alloc, va, pa, size, perm).is_err() {
            panic!("kernel_map: out of memory mapping {va:?}");
        }
    }

    /// Remove `pages` leaves starting at `va`, optionally returning their
    /// frames to `alloc`.
    ///
    /// # Panics
    /// If `va` is not aligned, or any page in the range has no table, is
    /// not mapped, or is not a leaf.
    pub fn unmap_range<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &A,
        va: VirtualAddress,
        pages: u64,
        free_backing: bool,
    ) {
        self.unmap_leaves(va, pages, free_backing.then_some(alloc));
    }

    pub(crate) fn unmap_leaves<A: FrameAlloc + ?Sized>(
        &self,
        va: VirtualAddress,
        pages: u64,
        free: Option<&A>,
    ) {
        assert!(va.is_page_aligned(), "unmap_range: {va:?} not aligned");

        for i in 0..pages {
            let addr = va + i * PAGE_SIZE;
            let Some(slot) = self.lookup(addr) else {
                panic!("unmap_range: no table for {addr:?}");
            };
            assert!(slot.is_valid(), "unmap_range: {addr:?} not mapped");
            assert!(slot.is_leaf(), "unmap_range: {addr:?} not a leaf");
            if let Some(alloc) = free {
                alloc.free_4k(slot.page());
            }
            *slot = PageEntry::EMPTY;
        }
    }

    /// Free every table node of the tree, root included.
    ///
    /// # Panics
    /// If a leaf is still mapped anywhere in the tree.
    pub fn free_tree<A: FrameAlloc + ?Sized>(self, alloc: &A) {
        self.free_nodes(self.root, PAGE_TABLE_LEVELS - 1, alloc, Leaves::Forbid);
    }

    /// Depth-first teardown of the table in `page`, which sits at `level`.
    pub(crate) fn free_nodes<A: FrameAlloc + ?Sized>(
        &self,
        page: PhysicalPage,
        level: usize,
        alloc: &A,
        leaves: Leaves,
    ) {
        let table = self.table(page);
        for index in 0..ENTRIES_PER_TABLE {
            let entry = table.get(index);
            if !entry.is_valid() {
                continue;
            }
            if entry.is_leaf() {
                assert!(
                    leaves == Leaves::Forget,
                    "free_tree: leaf {:?} still mapped in {page:?}",
                    entry.page()
                );
            } else {
                assert!(level > 0, "free_tree: table pointer at level 0 in {page:?}");
                self.free_nodes(entry.page(), level - 1, alloc, leaves);
            }
            table.set(index, PageEntry::EMPTY);
        }
        alloc.free_4k(page);
    }

    /// Call `f(depth, index, entry)` for every valid entry, parents first.
    ///
    /// `depth` is 0 for the root table.
    pub fn visit(&self, mut f: impl FnMut(usize, usize, PageEntry)) {
        self.visit_table(self.root, 0, &mut f);
    }

    fn visit_table(
        &self,
        page: PhysicalPage,
        depth: usize,
        f: &mut dyn FnMut(usize, usize, PageEntry),
    ) {
        for (index, entry) in self.table(page).valid_entries() {
            f(depth, index, entry);
            if entry.is_table() && depth + 1 < PAGE_TABLE_LEVELS {
                self.visit_table(entry.page(), depth + 1, f);
            }
        }
    }

    /// Log every valid entry; returns how many were printed.
    pub fn dump(&self) -> usize {
        const DOTS: &str = " .. .. ..";

        info!("page table {:?}", self.root);
        let mut count = 0;
        self.visit(|depth, index, entry| {
            count += 1;
            info!(
                "{}{index}: pte {:#018x} pa {:?}",
                &DOTS[..3 * (depth + 1)],
                entry.into_bits(),
                entry.page().base()
            );
        });
        count
    }
}
