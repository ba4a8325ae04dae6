use kernel_bio::{BufferCache, LogicalClock, RamDisk};
use kernel_sync::install_yield;
use std::sync::Barrier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

const DEV: u32 = 1;

fn counter(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

fn bump(data: &mut [u8]) {
    let next = counter(data) + 1;
    data[..4].copy_from_slice(&next.to_le_bytes());
}

#[test]
fn one_holder_per_block_at_a_time() {
    install_yield(thread::yield_now);

    const THREADS: usize = 4;
    const ITERS: usize = 300;

    let cache = BufferCache::new(RamDisk::new(), LogicalClock::new(), 3);
    let inside = AtomicUsize::new(0);
    let start = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                start.wait();
                for _ in 0..ITERS {
                    let mut buf = cache.read(DEV, 7);
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0, "two holders");
                    bump(buf.data_mut());
                    cache.write(&buf);
                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            });
        }
    });

    let total = u32::try_from(THREADS * ITERS).unwrap();
    assert_eq!(counter(&cache.device().snapshot(DEV, 7)), total);
    assert_eq!(counter(cache.read(DEV, 7).data()), total);
    assert_eq!(cache.device().reads(), 1);
}

#[test]
fn eviction_under_contention_keeps_blocks_coherent() {
    install_yield(thread::yield_now);

    const THREADS: usize = 4;
    const ITERS: usize = 250;
    const BLOCKS: u32 = 17;

    // Fewer buffers than blocks, more than threads: misses recycle buffers
    // across buckets while other threads hold theirs.
    let cache = BufferCache::new(RamDisk::new(), LogicalClock::new(), 6);
    let start = Barrier::new(THREADS);

    thread::scope(|s| {
        for t in 0..THREADS {
            let (cache, start) = (&cache, &start);
            s.spawn(move || {
                start.wait();
                for i in 0..ITERS {
                    #[allow(clippy::cast_possible_truncation)]
                    let block = ((t * 5 + i * 3) % BLOCKS as usize) as u32;
                    let mut buf = cache.read(DEV, block);
                    assert_eq!(buf.block_number(), block);
                    bump(buf.data_mut());
                    cache.write(&buf);
                    drop(buf);
                    if i % 10 == 0 {
                        cache.clock().tick();
                    }
                }
            });
        }
    });

    let sum: u32 = (0..BLOCKS)
        .map(|b| counter(&cache.device().snapshot(DEV, b)))
        .sum();
    assert_eq!(sum, u32::try_from(THREADS * ITERS).unwrap());

    // Everything is idle again, and each block is cached at most once.
    let cached: usize = (0..BLOCKS)
        .filter_map(|b| cache.refcount(DEV, b))
        .inspect(|&r| assert_eq!(r, 0))
        .count();
    assert!(cached <= cache.capacity());
    let indexed: usize = (0..13).map(|b| cache.bucket_len(b)).sum();
    assert_eq!(indexed, cache.capacity());
}
