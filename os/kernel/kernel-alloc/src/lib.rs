//! # Physical Frame Allocation
//!
//! Owns all physical memory above the kernel image in 4 KiB frames and
//! hands them to the page-table code and everything else in the kernel.
//!
//! ```text
//!  core 0        core 1        core 2
//! ┌────────┐   ┌────────┐   ┌────────┐
//! │ shard 0│   │ shard 1│   │ shard 2│   one spin lock each
//! │ head ──┼─┐ │ head ──┼─┐ │ (empty)│
//! └────────┘ │ └────────┘ │ └────────┘
//!            ▼            ▼
//!   links: [ 3 | NIL | 0 | 1 | NIL | ... ]   next free frame, by index
//! ```
//!
//! * [`FrameAllocator`]: per-core free lists ("shards"). A core allocates
//!   from and frees to its own shard and only looks at the others when its
//!   own runs dry.
//! * [`DirectMap`]: the kernel's [`PhysMapper`](kernel_vmem::PhysMapper),
//!   valid because all of RAM is mapped at its physical address.
//! * [`PhysicalMemory`]: a heap-backed frame arena with its own physical
//!   address range, for hosted tests and simulators.
//!
//! Free-list links live in a side table indexed by frame number, never in
//! the free frames themselves; frame contents are only ever overwritten
//! with the junk patterns from [`kernel_info::params`].
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::{FrameAllocator, PhysicalMemory};
//! use kernel_sync::UniCore;
//! use kernel_vmem::PhysicalAddress;
//!
//! let ram = PhysicalMemory::new(PhysicalAddress::new(0x8000_0000), 16);
//! let frames = FrameAllocator::new(&ram, UniCore::new(), ram.start(), ram.end(), 1);
//! let page = frames.allocate().unwrap();
//! assert_eq!(frames.free_frames(), 15);
//! frames.free(page.base());
//! assert_eq!(frames.free_frames(), 16);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod frame_alloc;
mod phys_mapper;

pub use frame_alloc::{FrameAllocError, FrameAllocator};
pub use phys_mapper::{DirectMap, PhysicalMemory};
