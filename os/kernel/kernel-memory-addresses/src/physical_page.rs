use crate::{PAGE_MASK, PAGE_SIZE, PhysicalAddress};
use core::fmt;

/// A 4 KiB page of physical memory, identified by its page-aligned base.
///
/// Physical pages are what the frame allocator hands out; each one is a
/// "frame" in allocator terms.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage(PhysicalAddress);

impl PhysicalPage {
    /// The page containing `addr`.
    #[inline]
    #[must_use]
    pub const fn containing(addr: PhysicalAddress) -> Self {
        Self(PhysicalAddress::new(addr.as_u64() & !PAGE_MASK))
    }

    /// Creates a page from an address that must already be page aligned.
    ///
    /// Returns `None` for unaligned addresses.
    #[inline]
    #[must_use]
    pub const fn from_aligned(addr: PhysicalAddress) -> Option<Self> {
        if addr.is_page_aligned() {
            Some(Self(addr))
        } else {
            None
        }
    }

    /// The page with the given physical page number.
    #[inline]
    #[must_use]
    pub const fn from_number(ppn: u64) -> Self {
        Self(PhysicalAddress::new(ppn * PAGE_SIZE))
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        self.0
    }

    /// Physical page number.
    #[inline]
    #[must_use]
    pub const fn number(self) -> u64 {
        self.0.as_u64() / PAGE_SIZE
    }

    /// The page directly following this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(PhysicalAddress::new(self.0.as_u64() + PAGE_SIZE))
    }

    /// Address of byte `offset` within this page.
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u64) -> PhysicalAddress {
        debug_assert!(offset < PAGE_SIZE);
        PhysicalAddress::new(self.0.as_u64() + offset)
    }
}

impl fmt::Debug for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage(0x{:x})", self.0.as_u64())
    }
}

impl From<PhysicalPage> for PhysicalAddress {
    #[inline]
    fn from(value: PhysicalPage) -> Self {
        value.base()
    }
}
