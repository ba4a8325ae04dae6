use kernel_memory_addresses::VirtualAddress;

/// Recoverable address-space failures.
///
/// Contract violations (remapping, unmapping what is not mapped, finding a
/// leaf where a table was required) are not represented here; they panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("{va:?} is not mapped for user access")]
    Unmapped { va: VirtualAddress },
    #[error("{va:?} is beyond the highest valid virtual address")]
    AddressOutOfRange { va: VirtualAddress },
    #[error("no string terminator within {max} bytes")]
    MissingTerminator { max: usize },
    #[error("destination buffer too small")]
    BufferTooSmall,
    #[error("user memory up to {end:#x} would overlap the kernel mappings")]
    MirrorOverlapsKernel { end: u64 },
}
