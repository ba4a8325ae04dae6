//! # Sv39 Page Table
//!
//! One 4 KiB node of the translation tree: 512 [`PageEntry`] slots indexed
//! by a 9-bit slice of the virtual address.
//!
//! ```text
//! | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  L2   |  L1   |  L0   | Offset |
//! ```

use crate::PageEntry;
use kernel_info::memory::{ENTRIES_PER_TABLE, PAGE_SHIFT};
use kernel_memory_addresses::VirtualAddress;

/// A page table node: 512 entries, 4 KiB-aligned.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntry; ENTRIES_PER_TABLE],
}

/// Slot index of `va` in a table at `level` (2 = root, 0 = leaf level).
#[inline]
#[must_use]
pub const fn table_index(va: VirtualAddress, level: usize) -> usize {
    ((va.as_u64() >> (PAGE_SHIFT as usize + 9 * level)) & 0x1FF) as usize
}

impl PageTable {
    /// Mark every slot absent.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageEntry::EMPTY);
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, index: usize) -> PageEntry {
        self.entries[index]
    }

    #[inline]
    pub const fn set(&mut self, index: usize, entry: PageEntry) {
        self.entries[index] = entry;
    }

    #[inline]
    pub const fn slot_mut(&mut self, index: usize) -> &mut PageEntry {
        &mut self.entries[index]
    }

    /// Valid entries with their slot index.
    pub fn valid_entries(&self) -> impl Iterator<Item = (usize, PageEntry)> + '_ {
        self.entries
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, e)| e.is_valid())
    }
}

const _: () = {
    assert!(size_of::<PageTable>() == 4096);
    assert!(align_of::<PageTable>() == 4096);
};
