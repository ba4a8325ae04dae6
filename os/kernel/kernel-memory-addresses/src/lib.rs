//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses and page bases used in
//! paging and memory management code.
//!
//! ## Overview
//!
//! The types prevent mixing virtual and physical addresses at compile time
//! while remaining zero-cost wrappers around `u64` values.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`VirtualAddress`] / [`VirtualPage`] | Refer to virtual (page-table translated) memory. |
//! | [`PhysicalAddress`] / [`PhysicalPage`] | Refer to physical memory or MMIO regions. |
//!
//! Pages are always 4 KiB ([`PAGE_SIZE`]); the address spaces built on top of
//! these types never use larger leaves.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x1234);
//! assert_eq!(va.page().base().as_u64(), 0x1000);
//! assert_eq!(va.offset(), 0x234);
//! assert_eq!(va.page_round_up().as_u64(), 0x2000);
//!
//! let pa = PhysicalAddress::new(0x8000_0042);
//! assert_eq!(pa.page().join(pa.offset()), pa);
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` and implement `Copy`, `Eq`, `Ord`, and
//!   `Hash`, making them suitable as map keys.
//! - All alignment and offset calculations are `const fn`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use kernel_info::memory::PAGE_SIZE;
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;

/// Mask of the in-page offset bits.
pub const PAGE_MASK: u64 = PAGE_SIZE - 1;

/// Rounds `value` up to the next page boundary.
///
/// Saturates at the highest page boundary representable in a `u64`.
#[inline]
#[must_use]
pub const fn page_round_up(value: u64) -> u64 {
    match value.checked_add(PAGE_MASK) {
        Some(v) => v & !PAGE_MASK,
        None => u64::MAX & !PAGE_MASK,
    }
}

/// Rounds `value` down to its page boundary.
#[inline]
#[must_use]
pub const fn page_round_down(value: u64) -> u64 {
    value & !PAGE_MASK
}

/// Number of whole pages needed to cover `bytes`.
#[inline]
#[must_use]
pub const fn pages_for(bytes: u64) -> u64 {
    page_round_up(bytes) / PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding() {
        assert_eq!(page_round_up(0), 0);
        assert_eq!(page_round_up(1), PAGE_SIZE);
        assert_eq!(page_round_up(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(page_round_up(PAGE_SIZE + 1), 2 * PAGE_SIZE);
        assert_eq!(page_round_down(PAGE_SIZE - 1), 0);
        assert_eq!(page_round_down(3 * PAGE_SIZE + 17), 3 * PAGE_SIZE);
        assert_eq!(page_round_up(u64::MAX), u64::MAX & !PAGE_MASK);
    }

    #[test]
    fn page_counts() {
        assert_eq!(pages_for(0), 0);
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(2 * PAGE_SIZE), 2);
        assert_eq!(pages_for(2 * PAGE_SIZE + 1), 3);
    }

    #[test]
    fn split_and_join() {
        let va = VirtualAddress::new(0x0000_0012_3456_7abc);
        assert_eq!(va.page().base().as_u64(), 0x0000_0012_3456_7000);
        assert_eq!(va.offset(), 0xabc);
        assert_eq!(va.page().join(va.offset()), va);

        let pa = PhysicalAddress::new(0x8765_4321);
        assert_eq!(pa.page().base(), PhysicalAddress::new(0x8765_4000));
        assert_eq!(pa.page().join(pa.offset()), pa);
    }

    #[test]
    fn page_numbers() {
        let page = PhysicalPage::from_number(0x80000);
        assert_eq!(page.base().as_u64(), 0x8000_0000);
        assert_eq!(page.number(), 0x80000);
        assert_eq!(page.next().base().as_u64(), 0x8000_1000);

        let vp = VirtualPage::containing(VirtualAddress::new(0x2fff));
        assert_eq!(vp.base().as_u64(), 0x2000);
        assert_eq!(vp.number(), 2);
    }

    #[test]
    fn formatting() {
        assert_eq!(format!("{:?}", VirtualAddress::new(0x1000)), "VA(0x1000)");
        assert_eq!(format!("{}", PhysicalAddress::new(0x8000_0000)), "0x80000000");
        assert_eq!(
            format!("{:?}", PhysicalPage::from_number(1)),
            "PhysicalPage(0x1000)"
        );
    }
}
