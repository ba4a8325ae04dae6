use crate::{PAGE_MASK, PAGE_SIZE, VirtualAddress};
use core::fmt;

/// A 4 KiB page of virtual memory, identified by its page-aligned base.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage(VirtualAddress);

impl VirtualPage {
    #[inline]
    #[must_use]
    pub const fn containing(addr: VirtualAddress) -> Self {
        Self(VirtualAddress::new(addr.as_u64() & !PAGE_MASK))
    }

    #[inline]
    #[must_use]
    pub const fn from_aligned(addr: VirtualAddress) -> Option<Self> {
        if addr.is_page_aligned() {
            Some(Self(addr))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn from_number(vpn: u64) -> Self {
        Self(VirtualAddress::new(vpn * PAGE_SIZE))
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn number(self) -> u64 {
        self.0.as_u64() / PAGE_SIZE
    }

    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(VirtualAddress::new(self.0.as_u64() + PAGE_SIZE))
    }

    #[inline]
    #[must_use]
    pub const fn join(self, offset: u64) -> VirtualAddress {
        debug_assert!(offset < PAGE_SIZE);
        VirtualAddress::new(self.0.as_u64() + offset)
    }
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage(0x{:x})", self.0.as_u64())
    }
}

impl From<VirtualPage> for VirtualAddress {
    #[inline]
    fn from(value: VirtualPage) -> Self {
        value.base()
    }
}
