use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicUsize, Ordering};
use kernel_info::params::BSIZE;
use kernel_sync::SpinLock;

/// The bytes of one disk block.
pub type BlockData = [u8; BSIZE];

/// A disk addressed in whole blocks. Both calls complete synchronously.
pub trait BlockDevice: Send + Sync {
    fn read_block(&self, device: u32, block: u32, buf: &mut BlockData);
    fn write_block(&self, device: u32, block: u32, buf: &BlockData);
}

impl<D: BlockDevice + ?Sized> BlockDevice for &D {
    fn read_block(&self, device: u32, block: u32, buf: &mut BlockData) {
        (**self).read_block(device, block, buf);
    }

    fn write_block(&self, device: u32, block: u32, buf: &BlockData) {
        (**self).write_block(device, block, buf);
    }
}

/// Blocks kept in memory; never-written blocks read as zeros.
///
/// Counts every transfer so callers can tell cache hits from misses.
#[derive(Default)]
pub struct RamDisk {
    blocks: SpinLock<BTreeMap<(u32, u32), Box<BlockData>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RamDisk {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            blocks: SpinLock::new(BTreeMap::new()),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Blocks transferred from the disk so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Blocks transferred to the disk so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Current on-disk content of a block.
    #[must_use]
    pub fn snapshot(&self, device: u32, block: u32) -> BlockData {
        self.blocks
            .lock()
            .get(&(device, block))
            .map_or([0; BSIZE], |data| **data)
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, device: u32, block: u32, buf: &mut BlockData) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        *buf = self.snapshot(device, block);
    }

    fn write_block(&self, device: u32, block: u32, buf: &BlockData) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.blocks.lock().insert((device, block), Box::new(*buf));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_blocks_are_zero() {
        let disk = RamDisk::new();
        let mut buf = [0xff; BSIZE];
        disk.read_block(1, 3, &mut buf);
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!((disk.reads(), disk.writes()), (1, 0));
    }

    #[test]
    fn devices_are_separate() {
        let disk = RamDisk::new();
        disk.write_block(1, 3, &[7; BSIZE]);
        assert_eq!(disk.snapshot(1, 3)[0], 7);
        assert_eq!(disk.snapshot(2, 3)[0], 0);
    }
}
