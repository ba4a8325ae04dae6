//! # Memory Layout

/// Bytes per page.
pub const PAGE_SIZE: u64 = 4096;

/// Bits of offset within a page.
pub const PAGE_SHIFT: u32 = 12;

/// Page table entries per table.
pub const ENTRIES_PER_TABLE: usize = 512;

/// Translation levels of an Sv39 address space.
pub const PAGE_TABLE_LEVELS: usize = 3;

/// One beyond the highest usable virtual address.
///
/// Sv39 allows 39 bits, but one less is used so that no address ever needs
/// sign extension into the upper bits.
pub const MAXVA: u64 = 1 << (9 + 9 + 9 + 12 - 1);

/// Core-local interruptor (timer) registers.
pub const CLINT: u64 = 0x0200_0000;

/// Size of the CLINT window.
pub const CLINT_SIZE: u64 = 0x1_0000;

/// Platform-level interrupt controller.
pub const PLIC: u64 = 0x0C00_0000;

/// Size of the PLIC window.
pub const PLIC_SIZE: u64 = 0x40_0000;

/// Serial console registers.
pub const UART0: u64 = 0x1000_0000;

/// Virtio disk registers.
pub const VIRTIO0: u64 = 0x1000_1000;

/// First byte of RAM; the kernel image is loaded here.
pub const KERNBASE: u64 = 0x8000_0000;

/// One beyond the last byte of RAM.
pub const PHYSTOP: u64 = KERNBASE + 128 * 1024 * 1024;

/// The trampoline page, mapped at the same address in every address space.
pub const TRAMPOLINE: u64 = MAXVA - PAGE_SIZE;

const _: () = {
    assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
    assert!(ENTRIES_PER_TABLE * 8 == PAGE_SIZE as usize);
    assert!(CLINT + CLINT_SIZE <= PLIC);
    assert!(PLIC + PLIC_SIZE <= UART0);
    assert!(UART0 < VIRTIO0);
    assert!(VIRTIO0 < KERNBASE);
    assert!(KERNBASE.is_multiple_of(PAGE_SIZE));
    assert!(PHYSTOP.is_multiple_of(PAGE_SIZE));
    assert!(PHYSTOP <= MAXVA);
    assert!(TRAMPOLINE.is_multiple_of(PAGE_SIZE));
};
