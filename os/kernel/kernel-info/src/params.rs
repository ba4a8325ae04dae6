//! # Tuning Parameters

/// Maximum number of processor cores.
pub const NCPU: usize = 8;

/// Default number of block buffers in the buffer cache.
pub const NBUF: usize = 30;

/// Number of hash buckets in the buffer cache. Prime, to spread block
/// numbers evenly.
pub const NBUCKET: usize = 13;

/// Bytes per disk block.
pub const BSIZE: usize = 1024;

/// Byte written over a frame when it is handed out.
pub const ALLOC_JUNK: u8 = 0x05;

/// Byte written over a frame when it is returned.
pub const FREE_JUNK: u8 = 0x01;

const _: () = {
    assert!(NCPU > 0);
    assert!(NBUF > 0);
    assert!(NBUCKET > 0);
    assert!(BSIZE.is_power_of_two());
    assert!(ALLOC_JUNK != FREE_JUNK);
};
