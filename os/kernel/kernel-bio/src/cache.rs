//! The buffer pool and its bucket index.

use crate::{BlockData, BlockDevice, Clock};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::mem::ManuallyDrop;
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_info::params::{BSIZE, NBUCKET};
use kernel_sync::{SleepLock, SleepLockGuard, SpinLock, yield_now};
use log::{debug, trace};

/// A block on a particular device.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BlockId {
    pub device: u32,
    pub block: u32,
}

impl BlockId {
    #[inline]
    #[must_use]
    pub const fn new(device: u32, block: u32) -> Self {
        Self { device, block }
    }

    /// The bucket holding this block's buffer, if cached.
    #[inline]
    #[must_use]
    pub const fn bucket(self) -> usize {
        self.block as usize % NBUCKET
    }
}

/// Bookkeeping for one buffer, owned by the bucket it sits in.
#[derive(Debug)]
struct Tag {
    slot: usize,
    /// `None` until first use.
    id: Option<BlockId>,
    refcnt: u32,
    stamp: u64,
}

struct Buffer {
    /// Whether `data` holds the block's content.
    valid: AtomicBool,
    data: SleepLock<BlockData>,
}

/// Outcome of one pass of the victim search.
enum Victim {
    /// Position in the home bucket.
    Home(usize),
    /// Moved out of a foreign bucket; not yet linked into the home one.
    Migrated(Tag),
    /// Some bucket was busy or the pick went stale; search again.
    Retry,
    /// Every buffer is referenced.
    None,
}

/// Fixed pool of block buffers indexed by 13 hash buckets.
pub struct BufferCache<D, K> {
    device: D,
    clock: K,
    buffers: Box<[Buffer]>,
    buckets: [SpinLock<Vec<Tag>>; NBUCKET],
}

impl<D: BlockDevice, K: Clock> BufferCache<D, K> {
    /// A cache of `nbuf` buffers, all idle and parked in bucket 0.
    ///
    /// # Panics
    /// If `nbuf` is zero.
    #[must_use]
    pub fn new(device: D, clock: K, nbuf: usize) -> Self {
        assert!(nbuf > 0, "buffer cache: no buffers");

        let buffers = (0..nbuf)
            .map(|_| Buffer {
                valid: AtomicBool::new(false),
                data: SleepLock::new([0; BSIZE]),
            })
            .collect();
        // Every buffer may end up in one bucket; migration must not allocate
        // under a bucket lock.
        let buckets = core::array::from_fn(|_| SpinLock::new(Vec::with_capacity(nbuf)));
        let this = Self {
            device,
            clock,
            buffers,
            buckets,
        };

        this.buckets[0].with_lock(|tags| {
            tags.extend((0..nbuf).map(|slot| Tag {
                slot,
                id: None,
                refcnt: 0,
                stamp: 0,
            }));
        });
        this
    }

    #[inline]
    pub const fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub const fn clock(&self) -> &K {
        &self.clock
    }

    /// Number of buffers in the pool.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffers.len()
    }

    /// Buffers currently indexed by bucket `bucket`.
    pub fn bucket_len(&self, bucket: usize) -> usize {
        self.buckets[bucket].lock().len()
    }

    /// Reference count of the cached buffer for `(device, block)`, or
    /// `None` when the block is not cached.
    pub fn refcount(&self, device: u32, block: u32) -> Option<u32> {
        let id = BlockId::new(device, block);
        self.buckets[id.bucket()]
            .lock()
            .iter()
            .find(|t| t.id == Some(id))
            .map(|t| t.refcnt)
    }

    /// The buffer for `(device, block)`, locked for the caller. Its content
    /// is only meaningful if [`BufferHandle::is_valid`].
    ///
    /// May yield while another holder has the buffer.
    ///
    /// # Panics
    /// If the block is not cached and every buffer is in use.
    pub fn acquire(&self, device: u32, block: u32) -> BufferHandle<'_, D, K> {
        let id = BlockId::new(device, block);
        let home = id.bucket();

        loop {
            let mut tags = self.buckets[home].lock();

            if let Some(tag) = tags.iter_mut().find(|t| t.id == Some(id)) {
                tag.refcnt += 1;
                tag.stamp = self.clock.now();
                let slot = tag.slot;
                drop(tags);
                trace!("acquire: {id:?} hit in buffer {slot}");
                return self.lock_buffer(slot, id);
            }

            let position = match self.find_victim(home, &tags) {
                Victim::Home(position) => position,
                Victim::Migrated(tag) => {
                    tags.push(tag);
                    tags.len() - 1
                }
                Victim::Retry => {
                    drop(tags);
                    yield_now();
                    continue;
                }
                Victim::None => panic!("acquire: no buffers for {id:?}"),
            };

            let tag = &mut tags[position];
            debug!("acquire: buffer {} recycled from {:?} for {id:?}", tag.slot, tag.id);
            tag.id = Some(id);
            tag.refcnt = 1;
            tag.stamp = self.clock.now();
            let slot = tag.slot;
            self.buffers[slot].valid.store(false, Ordering::Release);
            drop(tags);
            return self.lock_buffer(slot, id);
        }
    }

    /// Find the idle buffer released longest ago, holding only the home
    /// bucket lock plus at most one other at a time. Busy buckets are
    /// skipped, never waited for, and the whole search is retried.
    fn find_victim(&self, home: usize, home_tags: &[Tag]) -> Victim {
        let mut best: Option<(usize, usize, u64)> = None;
        let mut consider = |bucket: usize, tags: &[Tag]| {
            for tag in tags.iter().filter(|t| t.refcnt == 0) {
                if best.is_none_or(|(_, _, stamp)| tag.stamp < stamp) {
                    best = Some((bucket, tag.slot, tag.stamp));
                }
            }
        };

        consider(home, home_tags);
        let mut skipped = false;
        for step in 1..NBUCKET {
            let bucket = (home + step) % NBUCKET;
            match self.buckets[bucket].try_lock() {
                Some(tags) => consider(bucket, &tags),
                None => skipped = true,
            }
        }

        // A skipped bucket may hold an older idle buffer than the pick.
        if skipped {
            return Victim::Retry;
        }
        let Some((bucket, slot, _)) = best else {
            return Victim::None;
        };
        if bucket == home {
            return home_tags
                .iter()
                .position(|t| t.slot == slot)
                .map_or(Victim::Retry, Victim::Home);
        }

        // The pick may have been taken since the scan; only move it if it
        // is still idle.
        let Some(mut tags) = self.buckets[bucket].try_lock() else {
            return Victim::Retry;
        };
        match tags.iter().position(|t| t.slot == slot && t.refcnt == 0) {
            Some(position) => {
                let tag = tags.swap_remove(position);
                drop(tags);
                trace!("acquire: moving buffer {slot} from bucket {bucket} to {home}");
                Victim::Migrated(tag)
            }
            None => Victim::Retry,
        }
    }

    fn lock_buffer(&self, slot: usize, id: BlockId) -> BufferHandle<'_, D, K> {
        BufferHandle {
            cache: self,
            slot,
            id,
            data: ManuallyDrop::new(self.buffers[slot].data.lock()),
        }
    }

    /// [`BufferCache::acquire`], then fill the buffer from the device unless
    /// it already holds the block.
    ///
    /// # Panics
    /// Like [`BufferCache::acquire`].
    pub fn read(&self, device: u32, block: u32) -> BufferHandle<'_, D, K> {
        let mut handle = self.acquire(device, block);
        if !handle.is_valid() {
            self.device.read_block(device, block, handle.data_mut());
            self.buffers[handle.slot].valid.store(true, Ordering::Release);
        }
        handle
    }

    /// Write the buffer's content to the device.
    ///
    /// # Panics
    /// If `handle` was handed out by a different cache.
    pub fn write(&self, handle: &BufferHandle<'_, D, K>) {
        assert!(
            core::ptr::eq(handle.cache, self),
            "write: buffer {} belongs to another cache",
            handle.slot
        );
        self.device
            .write_block(handle.id.device, handle.id.block, handle.data());
    }

    /// Give the buffer back; same as dropping the handle.
    pub fn release(&self, handle: BufferHandle<'_, D, K>) {
        drop(handle);
    }

    /// Keep the buffer cached after `handle` is released, until the
    /// returned pin is dropped or passed to [`BufferCache::unpin`].
    pub fn pin<'c>(&'c self, handle: &BufferHandle<'c, D, K>) -> PinnedBuffer<'c, D, K> {
        self.adjust(handle.slot, handle.id, "pin", |tag| tag.refcnt += 1);
        PinnedBuffer {
            cache: self,
            slot: handle.slot,
            id: handle.id,
        }
    }

    pub fn unpin(&self, pin: PinnedBuffer<'_, D, K>) {
        drop(pin);
    }

    /// Run `f` on the tag of buffer `slot` under its bucket lock.
    fn adjust(&self, slot: usize, id: BlockId, op: &str, f: impl FnOnce(&mut Tag)) {
        let mut tags = self.buckets[id.bucket()].lock();
        let Some(tag) = tags.iter_mut().find(|t| t.slot == slot) else {
            panic!("{op}: buffer {slot} missing from bucket {}", id.bucket());
        };
        assert!(tag.refcnt > 0, "{op}: buffer {slot} not referenced");
        f(tag);
    }
}

/// Exclusive access to one cached block. Dropping it releases the buffer.
pub struct BufferHandle<'c, D: BlockDevice, K: Clock> {
    cache: &'c BufferCache<D, K>,
    slot: usize,
    id: BlockId,
    data: ManuallyDrop<SleepLockGuard<'c, BlockData>>,
}

impl<D: BlockDevice, K: Clock> BufferHandle<'_, D, K> {
    #[inline]
    pub fn data(&self) -> &BlockData {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut BlockData {
        &mut self.data
    }

    #[inline]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    #[inline]
    pub const fn device(&self) -> u32 {
        self.id.device
    }

    #[inline]
    pub const fn block_number(&self) -> u32 {
        self.id.block
    }

    /// Whether the buffer holds the block's content.
    pub fn is_valid(&self) -> bool {
        self.cache.buffers[self.slot].valid.load(Ordering::Acquire)
    }
}

impl<D: BlockDevice, K: Clock> Drop for BufferHandle<'_, D, K> {
    fn drop(&mut self) {
        // SAFETY: dropped exactly once, here; `data` is not used afterwards.
        unsafe { ManuallyDrop::drop(&mut self.data) };

        let clock = &self.cache.clock;
        self.cache.adjust(self.slot, self.id, "release", |tag| {
            tag.refcnt -= 1;
            tag.stamp = clock.now();
        });
    }
}

impl<D: BlockDevice, K: Clock> fmt::Debug for BufferHandle<'_, D, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferHandle")
            .field("slot", &self.slot)
            .field("id", &self.id)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

/// A reference that keeps a buffer from being recycled without locking it.
#[must_use = "dropping the pin unpins the buffer"]
pub struct PinnedBuffer<'c, D: BlockDevice, K: Clock> {
    cache: &'c BufferCache<D, K>,
    slot: usize,
    id: BlockId,
}

impl<D: BlockDevice, K: Clock> PinnedBuffer<'_, D, K> {
    #[inline]
    pub const fn id(&self) -> BlockId {
        self.id
    }
}

impl<D: BlockDevice, K: Clock> Drop for PinnedBuffer<'_, D, K> {
    fn drop(&mut self) {
        self.cache
            .adjust(self.slot, self.id, "unpin", |tag| tag.refcnt -= 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogicalClock, RamDisk};

    type Cache = BufferCache<RamDisk, LogicalClock>;

    fn cache(nbuf: usize) -> Cache {
        BufferCache::new(RamDisk::new(), LogicalClock::new(), nbuf)
    }

    /// Read and release `block` on device 1, then let time pass.
    fn touch(cache: &Cache, block: u32) {
        drop(cache.read(1, block));
        cache.clock().tick();
    }

    #[test]
    fn buffers_start_in_bucket_zero() {
        let cache = cache(5);
        assert_eq!(cache.capacity(), 5);
        assert_eq!(cache.bucket_len(0), 5);
        assert!((1..NBUCKET).all(|b| cache.bucket_len(b) == 0));
    }

    #[test]
    fn recycled_buffers_move_to_their_home_bucket() {
        let cache = cache(3);
        touch(&cache, 14);
        assert_eq!((cache.bucket_len(0), cache.bucket_len(1)), (2, 1));
        touch(&cache, 26);
        assert_eq!(cache.bucket_len(0), 2);
    }

    #[test]
    fn hits_do_not_touch_the_device() {
        let cache = cache(3);
        let first = cache.read(1, 5);
        assert!(first.is_valid());
        assert_eq!((first.device(), first.block_number()), (1, 5));
        drop(first);

        let again = cache.read(1, 5);
        assert_eq!(cache.device().reads(), 1);
        assert_eq!(cache.refcount(1, 5), Some(1));
        drop(again);
        assert_eq!(cache.refcount(1, 5), Some(0));
    }

    #[test]
    fn same_block_on_another_device_is_another_buffer() {
        let cache = cache(3);
        touch(&cache, 5);
        touch(&cache, 5);
        let other = cache.read(2, 5);
        assert_eq!(cache.device().reads(), 2);
        assert_eq!(cache.refcount(1, 5), Some(0));
        drop(other);
    }

    #[test]
    fn acquire_hands_out_unfilled_buffers() {
        let cache = cache(2);
        let handle = cache.acquire(1, 9);
        assert!(!handle.is_valid());
        assert_eq!(cache.device().reads(), 0);
    }

    #[test]
    fn least_recently_released_buffer_is_recycled() {
        let cache = cache(3);
        touch(&cache, 1);
        touch(&cache, 2);
        touch(&cache, 3);
        touch(&cache, 1);

        // Block 2 was released longest ago.
        touch(&cache, 4);
        assert_eq!(cache.refcount(1, 2), None);
        for block in [1, 3, 4] {
            assert_eq!(cache.refcount(1, block), Some(0), "block {block}");
        }
    }

    #[test]
    fn ties_go_to_the_first_buffer_found() {
        // Without ticks every stamp is equal; the scan starts at the home
        // bucket of the missing block.
        let cache = cache(2);
        drop(cache.read(1, 1));
        drop(cache.read(1, 2));
        drop(cache.read(1, 14));
        assert_eq!(cache.refcount(1, 1), None);
        assert_eq!(cache.refcount(1, 2), Some(0));
    }

    #[test]
    fn referenced_buffers_are_never_recycled() {
        let cache = cache(2);
        let held = cache.read(1, 1);
        cache.clock().tick();
        touch(&cache, 2);
        touch(&cache, 3);
        assert_eq!(cache.refcount(1, 1), Some(1));
        assert_eq!(cache.refcount(1, 2), None);
        drop(held);
    }

    #[test]
    fn pinned_buffers_stay_cached() {
        let cache = cache(2);
        let handle = cache.read(1, 1);
        let pin = cache.pin(&handle);
        assert_eq!(pin.id(), BlockId::new(1, 1));
        cache.release(handle);
        assert_eq!(cache.refcount(1, 1), Some(1));

        touch(&cache, 2);
        touch(&cache, 3);
        assert_eq!(cache.refcount(1, 1), Some(1));

        cache.unpin(pin);
        assert_eq!(cache.refcount(1, 1), Some(0));
        touch(&cache, 4);
        assert_eq!(cache.refcount(1, 1), None);
    }

    #[test]
    fn writes_survive_eviction() {
        let cache = cache(2);
        {
            let mut buf = cache.read(1, 8);
            buf.data_mut()[..4].copy_from_slice(b"\xde\xad\xbe\xef");
            cache.write(&buf);
        }
        touch(&cache, 9);
        touch(&cache, 10);
        assert_eq!(cache.refcount(1, 8), None);

        let buf = cache.read(1, 8);
        assert_eq!(&buf.data()[..4], b"\xde\xad\xbe\xef");
        assert_eq!(cache.device().writes(), 1);
    }

    #[test]
    fn recycled_buffer_is_refilled() {
        let cache = cache(1);
        cache.device().write_block(1, 2, &[2; BSIZE]);
        touch(&cache, 1);
        assert_eq!(cache.read(1, 2).data()[0], 2);
    }

    #[test]
    #[should_panic(expected = "acquire: no buffers for BlockId { device: 1, block: 3 }")]
    fn running_out_of_buffers_is_fatal() {
        let cache = cache(2);
        let _a = cache.read(1, 1);
        let _b = cache.read(1, 2);
        let _c = cache.read(1, 3);
    }

    #[test]
    #[should_panic(expected = "acquire: no buffers for BlockId { device: 1, block: 3 }")]
    fn pinning_every_buffer_is_fatal() {
        let cache = cache(2);
        let pins: Vec<_> = [1, 2]
            .into_iter()
            .map(|block| {
                let buf = cache.read(1, block);
                cache.pin(&buf)
            })
            .collect();
        assert_eq!(cache.refcount(1, 1), Some(1));
        let _c = cache.read(1, 3);
        drop(pins);
    }

    #[test]
    fn busy_buckets_are_waited_out_not_passed_over() {
        let cache = cache(2);
        touch(&cache, 1);
        touch(&cache, 2);

        // Block 1 is the older idle buffer, but its bucket is busy.
        std::thread::scope(|s| {
            let held = cache.buckets[1].lock();
            let reader = s.spawn(|| drop(cache.read(1, 3)));
            std::thread::sleep(std::time::Duration::from_millis(20));
            assert!(!reader.is_finished());
            drop(held);
            reader.join().unwrap();
        });

        assert_eq!(cache.refcount(1, 1), None);
        assert_eq!(cache.refcount(1, 2), Some(0));
        assert_eq!(cache.refcount(1, 3), Some(0));
    }

    #[test]
    fn migration_fits_in_reserved_bucket_space() {
        let cache = cache(4);
        let before: Vec<_> = cache.buckets.iter().map(|b| b.lock().as_ptr()).collect();
        for block in [5, 18, 31, 44] {
            touch(&cache, block);
        }
        assert_eq!(cache.bucket_len(5), 4);
        for (bucket, ptr) in cache.buckets.iter().zip(before) {
            let tags = bucket.lock();
            assert!(tags.capacity() >= 4);
            assert_eq!(tags.as_ptr(), ptr);
        }
    }

    #[test]
    #[should_panic(expected = "write: buffer 0 belongs to another cache")]
    fn writing_through_a_foreign_cache_is_fatal() {
        let mine = cache(1);
        let theirs = cache(1);
        let buf = mine.read(1, 1);
        theirs.write(&buf);
    }
}
