//! # Sv39 Page Table Entry

use crate::PagePermissions;
use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalPage;

/// A single 64-bit Sv39 page table entry in its raw bitfield form.
///
/// ### Bit layout
///
/// | Bits   | Name  | Meaning |
/// |--------|-------|---------|
/// | 0      | `V`   | Valid entry if set |
/// | 1      | `R`   | Readable |
/// | 2      | `W`   | Writable |
/// | 3      | `X`   | Executable |
/// | 4      | `U`   | Accessible from user mode |
/// | 5      | `G`   | Global mapping |
/// | 6      | `A`   | Accessed |
/// | 7      | `D`   | Dirty |
/// | 8–9    | `RSW` | Reserved for software |
/// | 10–53  | `PPN` | Physical page number |
/// | 54–63  | -     | Reserved, must be zero |
///
/// ### Entry kinds
/// - **Absent**: `V = 0` (the whole word is zero in practice).
/// - **Table pointer**: `V = 1` and none of `R`, `W`, `X`; `PPN` names the
///   child table.
/// - **Leaf**: `V = 1` and at least one of `R`, `W`, `X`.
///
/// ### Example
/// ```rust
/// # use kernel_memory_addresses::PhysicalPage;
/// # use kernel_vmem::{PageEntry, PagePermissions};
/// let page = PhysicalPage::from_number(0x80123);
/// let e = PageEntry::leaf(page, PagePermissions::READ_WRITE);
/// assert!(e.is_leaf());
/// assert_eq!(e.page(), page);
/// assert!(PageEntry::table(page).is_table());
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntry {
    pub valid: bool,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub user: bool,
    pub global: bool,
    pub accessed: bool,
    pub dirty: bool,
    #[bits(2)]
    pub rsw: u8,
    #[bits(44)]
    pub ppn: u64,
    #[bits(10)]
    __: u16,
}

impl PageEntry {
    /// The absent entry.
    pub const EMPTY: Self = Self::new();

    /// An entry pointing at the child table in `page`.
    #[inline]
    #[must_use]
    pub const fn table(page: PhysicalPage) -> Self {
        Self::new().with_valid(true).with_ppn(page.number())
    }

    /// A leaf mapping `page` with `perm`.
    #[inline]
    #[must_use]
    pub const fn leaf(page: PhysicalPage, perm: PagePermissions) -> Self {
        Self::new()
            .with_valid(true)
            .with_readable(perm.read())
            .with_writable(perm.write())
            .with_executable(perm.execute())
            .with_user(perm.user())
            .with_global(perm.global())
            .with_ppn(page.number())
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.valid()
    }

    /// Valid and carrying at least one access bit.
    #[inline]
    #[must_use]
    pub const fn is_leaf(self) -> bool {
        self.valid() && (self.readable() || self.writable() || self.executable())
    }

    /// Valid without access bits, i.e. pointing at a lower-level table.
    #[inline]
    #[must_use]
    pub const fn is_table(self) -> bool {
        self.valid() && !(self.readable() || self.writable() || self.executable())
    }

    /// The physical page named by the `PPN` field.
    #[inline]
    #[must_use]
    pub const fn page(self) -> PhysicalPage {
        PhysicalPage::from_number(self.ppn())
    }

    /// The permission bits of a leaf.
    #[inline]
    #[must_use]
    pub const fn permissions(self) -> PagePermissions {
        PagePermissions::NONE
            .with_read(self.readable())
            .with_write(self.writable())
            .with_execute(self.executable())
            .with_user(self.user())
            .with_global(self.global())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_positions_follow_sv39() {
        let page = PhysicalPage::from_number(0x8_0001);
        let e = PageEntry::leaf(page, PagePermissions::USER_RWX);
        assert_eq!(e.into_bits(), (0x8_0001 << 10) | 0b1_1111);

        let t = PageEntry::table(page);
        assert_eq!(t.into_bits(), (0x8_0001 << 10) | 1);
        assert!(!t.is_leaf());
    }

    #[test]
    fn empty_is_zero() {
        assert_eq!(PageEntry::EMPTY.into_bits(), 0);
        assert!(!PageEntry::EMPTY.is_valid());
        assert!(!PageEntry::EMPTY.is_leaf());
        assert!(!PageEntry::EMPTY.is_table());
    }

    #[test]
    fn permissions_survive_encoding() {
        let perm = PagePermissions::READ_EXECUTE.with_global(true);
        let e = PageEntry::leaf(PhysicalPage::from_number(3), perm);
        assert_eq!(e.permissions(), perm);
        assert_eq!(e.with_user(false).permissions(), perm);
    }
}
