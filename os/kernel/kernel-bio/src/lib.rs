//! # Block Buffer Cache
//!
//! Cached copies of disk blocks, shared by everything above the disk
//! driver. A buffer is handed out to one holder at a time; holders may
//! sleep (yield) while they have it, e.g. across device I/O.
//!
//! ## Layout
//!
//! ```text
//!  buckets (spin locks, block % 13)        buffers (sleep locks)
//! ┌────┐
//! │  0 │─▶ {slot 4, (1, 26), ref 0, t 17}   ┌──────────────────────┐
//! │  1 │─▶ {slot 0, (1, 14), ref 2, t 40}   │ 0: valid, [u8; 1024] │
//! │ .. │                                    │ 1: ...               │
//! │ 12 │─▶ {slot 1, (1, 12), ref 0, t  3}   └──────────────────────┘
//! └────┘
//! ```
//!
//! Identity and reference counts live in the bucket of the block number,
//! under that bucket's spin lock; the bytes live with the buffer under its
//! sleep lock. On a miss the least recently released idle buffer anywhere
//! is recycled and moved into the home bucket. The search never waits for
//! a second bucket lock: busy buckets are skipped and the search retried.
//!
//! Recency is a timestamp from a [`Clock`], not list position.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_bio::{BufferCache, LogicalClock, RamDisk};
//!
//! let cache = BufferCache::new(RamDisk::new(), LogicalClock::new(), 4);
//! {
//!     let mut buf = cache.read(1, 7);
//!     buf.data_mut()[0] = 0xab;
//!     cache.write(&buf);
//! } // released here
//! assert_eq!(cache.read(1, 7).data()[0], 0xab);
//! assert_eq!(cache.device().reads(), 1);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod cache;
mod clock;
mod device;

pub use cache::{BlockId, BufferCache, BufferHandle, PinnedBuffer};
pub use clock::{Clock, LogicalClock};
pub use device::{BlockData, BlockDevice, RamDisk};
