//! # Kernel synchronization primitives
//!
//! * [`SpinLock`]: busy-waiting mutual exclusion for short critical sections.
//! * [`SleepLock`]: mutual exclusion for long holds; waiters give up the
//!   processor through [`yield_now`] instead of spinning.
//! * [`SyncOnceCell`]: one-time initialization of shared statics.
//! * [`Cpu`] and [`PreemptGuard`]: identify the executing core and keep
//!   the current thread pinned to it.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod cpu;
mod sched;
mod sleep_lock;
mod spin_lock;
mod sync_once_cell;

pub use cpu::{Cpu, PreemptGuard, UniCore};
pub use sched::{install_yield, yield_now};
pub use sleep_lock::{SleepLock, SleepLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
