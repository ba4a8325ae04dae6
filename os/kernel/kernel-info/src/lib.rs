//! # Kernel Layout and Tuning Information
//!
//! Compile-time constants shared by every part of the memory core: the
//! physical and virtual memory layout of the target board, and the tuning
//! parameters of the frame allocator and the block buffer cache.
//!
//! ## Physical Memory Layout
//!
//! The layout follows the QEMU `virt` RISC-V machine:
//!
//! ```text
//! 0x0200_0000 ┌─────────────────────────────────┐ CLINT
//!             │   Core-local interruptor        │
//! 0x0C00_0000 ├─────────────────────────────────┤ PLIC
//!             │   Platform interrupt ctrl       │
//! 0x1000_0000 ├─────────────────────────────────┤ UART0
//! 0x1000_1000 ├─────────────────────────────────┤ VIRTIO0
//!             │         ...                     │
//! 0x8000_0000 ├─────────────────────────────────┤ KERNBASE
//!             │   Kernel image (text, data)     │
//!             ├─────────────────────────────────┤ end of kernel
//!             │   Frames managed by allocator   │
//! 0x8800_0000 └─────────────────────────────────┘ PHYSTOP
//! ```
//!
//! ## Virtual Memory Layout
//!
//! * User images start at virtual address zero and grow upward.
//! * The kernel maps every device window and all of RAM at identical
//!   virtual addresses.
//! * The trampoline page occupies the highest page below [`memory::MAXVA`].
//!
//! ## Configuration Management
//!
//! Everything here is `const`; compile-time assertions reject inconsistent
//! layouts. Values that only make sense at runtime (the managed frame range,
//! the number of cores, the buffer count) are passed to constructors instead,
//! using [`params`] as defaults.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod params;
