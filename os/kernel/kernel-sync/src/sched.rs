//! Giving up the processor while waiting.

use crate::SyncOnceCell;
use core::hint::spin_loop;

static YIELD_HOOK: SyncOnceCell<fn()> = SyncOnceCell::new();

/// Installs the scheduler's yield routine.
///
/// Only the first installation takes effect; returns whether this call won.
pub fn install_yield(hook: fn()) -> bool {
    YIELD_HOOK.set(hook).is_ok()
}

/// Lets other work run before the caller retries.
///
/// Falls back to a spin-loop hint until a scheduler installs its hook.
#[inline]
pub fn yield_now() {
    match YIELD_HOOK.get() {
        Some(hook) => hook(),
        None => spin_loop(),
    }
}
