use crate::stack::WORD;
use crate::{Collector, GcConfig, GcError, RawAlloc, SystemAlloc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::Cell;
use std::ptr::NonNull;

#[derive(Default)]
struct CountingAlloc {
    allocs: Cell<usize>,
    frees: Cell<usize>,
    fail: Cell<bool>,
}

unsafe impl RawAlloc for CountingAlloc {
    unsafe fn alloc(&self, size: usize) -> *mut u8 {
        if self.fail.get() {
            return std::ptr::null_mut();
        }

        self.allocs.set(self.allocs.get() + 1);
        SystemAlloc.alloc(size)
    }

    unsafe fn alloc_zeroed(&self, size: usize) -> *mut u8 {
        if self.fail.get() {
            return std::ptr::null_mut();
        }

        self.allocs.set(self.allocs.get() + 1);
        SystemAlloc.alloc_zeroed(size)
    }

    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        if self.fail.get() {
            return std::ptr::null_mut();
        }

        SystemAlloc.realloc(ptr, size)
    }

    unsafe fn free(&self, ptr: *mut u8) {
        if !ptr.is_null() {
            self.frees.set(self.frees.get() + 1);
        }

        SystemAlloc.free(ptr)
    }
}

fn config(initial_capacity: usize) -> GcConfig {
    GcConfig {
        initial_capacity,
        ..GcConfig::default()
    }
}

fn counting_gc(heap: &CountingAlloc, initial_capacity: usize) -> Collector<&CountingAlloc> {
    Collector::with_allocator(heap, config(initial_capacity))
}

// Runs a mark and sweep whose only roots are `roots`, leaving the stack out
// of it so results do not depend on stale stack slots. Blocks that must not
// keep anything alive by accident are allocated zeroed.
fn collect_from<A: RawAlloc>(gc: &mut Collector<A>, roots: &[usize]) -> usize {
    unsafe { gc.mark_region(roots.as_ptr().cast(), std::mem::size_of_val(roots)) };

    gc.sweep()
}

fn store(block: NonNull<u8>, slot: usize, value: usize) {
    unsafe { block.as_ptr().cast::<usize>().add(slot).write(value) };
}

/// Blocks are rooted through an explicit region here. Dropping a root from
/// the real stack cannot be checked deterministically, since the old value
/// may linger in a dead stack slot or a spilled register.
#[test]
fn chained_blocks_live_and_die_together() {
    let mut gc = Collector::with_config(config(64));
    let a = gc.alloc(16).unwrap();
    let b = gc.alloc(16).unwrap();

    store(b, 0, a.as_ptr() as usize);

    let mut roots = vec![b.as_ptr() as usize];

    assert_eq!(collect_from(&mut gc, &roots), 0);
    assert!(gc.contains(a.as_ptr()));
    assert!(gc.contains(b.as_ptr()));

    roots[0] = 0;

    let before = gc.collected_total();

    assert_eq!(collect_from(&mut gc, &roots), 2);
    assert_eq!(gc.collected_total(), before + 2);
    assert!(!gc.contains(a.as_ptr()));
    assert!(!gc.contains(b.as_ptr()));
    assert_eq!(gc.live_count(), 0);
}

#[test]
fn unreachable_cycles_are_collected() {
    let mut gc = Collector::with_config(config(64));
    let a = gc.alloc_zeroed(1, 8).unwrap();
    let b = gc.alloc_zeroed(1, 8).unwrap();
    let c = gc.alloc_zeroed(1, 8).unwrap();

    store(a, 0, b.as_ptr() as usize);
    store(b, 0, c.as_ptr() as usize);
    store(c, 0, a.as_ptr() as usize);

    assert_eq!(collect_from(&mut gc, &[c.as_ptr() as usize]), 0);
    assert_eq!(gc.live_count(), 3);

    assert_eq!(collect_from(&mut gc, &[]), 3);
    assert_eq!(gc.live_count(), 0);
}

#[test]
fn misaligned_interior_pointers_are_followed() {
    let mut gc = Collector::with_config(config(64));
    let a = gc.alloc(8).unwrap();
    let b = gc.alloc_zeroed(1, 24).unwrap();

    unsafe {
        b.as_ptr()
            .add(3)
            .cast::<usize>()
            .write_unaligned(a.as_ptr() as usize)
    };

    assert_eq!(collect_from(&mut gc, &[b.as_ptr() as usize]), 0);
    assert!(gc.contains(a.as_ptr()));
}

#[test]
fn pointers_into_the_middle_of_a_block_do_not_count() {
    let mut gc = Collector::with_config(config(64));
    let a = gc.alloc(64).unwrap();
    let inner = a.as_ptr() as usize + 8;

    assert_eq!(collect_from(&mut gc, &[inner]), 1);
    assert_eq!(gc.live_count(), 0);
}

#[test]
fn second_sweep_reclaims_nothing() {
    let mut gc = Collector::with_config(config(64));
    let kept = gc.alloc_zeroed(1, 16).unwrap();
    let _dropped = gc.alloc(16).unwrap();

    assert_eq!(collect_from(&mut gc, &[kept.as_ptr() as usize]), 1);
    assert_eq!(gc.sweep(), 0);
    assert_eq!(gc.sweep(), 0);
    assert!(gc.contains(kept.as_ptr()));
    assert_eq!(gc.collections(), 1);
}

#[test]
fn sweeping_an_empty_table_is_a_noop() {
    let heap = CountingAlloc::default();
    let mut gc = counting_gc(&heap, 16);

    assert_eq!(collect_from(&mut gc, &[]), 0);
    assert_eq!(heap.frees.get(), 0);
    assert_eq!(gc.capacity(), 16);
}

#[test]
fn passing_the_threshold_triggers_a_collection() {
    let mut gc = Collector::with_config(config(16));
    let threshold = gc.sweep_threshold();

    assert_eq!(threshold, 12);

    for _ in 0..=threshold {
        gc.alloc(8).unwrap();
    }

    assert!(gc.need_collect());
    assert_eq!(gc.collections(), 0);

    gc.alloc(8).unwrap();

    assert_eq!(gc.collections(), 1);
}

#[test]
fn sweep_grows_a_crowded_table() {
    let mut gc = Collector::with_config(config(8));
    let blocks: Vec<usize> = (0..7).map(|_| gc.alloc(8).unwrap().as_ptr() as usize).collect();

    assert_eq!(gc.collections(), 0);
    assert!(gc.need_resize());

    assert_eq!(collect_from(&mut gc, &blocks), 0);

    assert_eq!(gc.capacity(), 16);
    assert_eq!(gc.sweep_threshold(), 12);
    assert_eq!(gc.live_count(), 7);
    assert!(!gc.need_collect());

    for block in blocks {
        assert!(gc.contains(block as *const u8));
    }
}

#[test]
fn zero_factors_do_not_grow_the_table_forever() {
    let mut gc = Collector::with_config(GcConfig {
        initial_capacity: 8,
        sweep_factor: 0.0,
        load_factor: 0.0,
    });
    let kept = gc.alloc_zeroed(1, 8).unwrap();

    for _ in 0..16 {
        assert_eq!(collect_from(&mut gc, &[kept.as_ptr() as usize]), 0);
    }

    assert_eq!(gc.live_count(), 1);
    assert_eq!(gc.capacity(), 8);
    assert_eq!(gc.sweep_threshold(), 1);
    assert_eq!(gc.collections(), 16);
}

#[test]
fn zero_sized_requests_have_no_effect() {
    let heap = CountingAlloc::default();
    let mut gc = counting_gc(&heap, 16);

    assert_eq!(gc.alloc(0), Err(GcError::ZeroSize));
    assert_eq!(gc.alloc_zeroed(0, 8), Err(GcError::ZeroSize));
    assert_eq!(gc.alloc_zeroed(8, 0), Err(GcError::ZeroSize));
    assert_eq!(gc.live_count(), 0);
    assert_eq!(heap.allocs.get(), 0);
}

#[test]
fn oversized_requests_are_refused() {
    let heap = CountingAlloc::default();
    let mut gc = counting_gc(&heap, 16);

    assert_eq!(gc.alloc(usize::MAX), Err(GcError::SizeOverflow));
    assert_eq!(
        gc.alloc_zeroed(usize::MAX / 8, 16),
        Err(GcError::SizeOverflow)
    );
    assert_eq!(heap.allocs.get(), 0);
    assert_eq!(gc.live_count(), 0);
}

#[test]
fn sizes_are_rounded_to_eight() {
    let mut gc = Collector::with_config(config(16));
    let a = gc.alloc(1).unwrap();
    let b = gc.alloc_zeroed(3, 5).unwrap();

    assert_eq!(gc.block_size(a.as_ptr()), Some(8));
    assert_eq!(gc.block_size(b.as_ptr()), Some(24));
    assert_eq!(gc.live_bytes(), 32);
    assert_eq!(a.as_ptr() as usize % 8, 0);
}

#[test]
fn out_of_memory_tracks_nothing() {
    let heap = CountingAlloc::default();
    let mut gc = counting_gc(&heap, 16);

    heap.fail.set(true);

    assert_eq!(gc.alloc(8), Err(GcError::OutOfMemory));
    assert_eq!(gc.alloc_zeroed(2, 8), Err(GcError::OutOfMemory));
    assert_eq!(gc.live_count(), 0);
}

#[test]
fn zero_sized_realloc_keeps_the_block() {
    let heap = CountingAlloc::default();
    let mut gc = counting_gc(&heap, 16);
    let block = gc.alloc(32).unwrap();

    let result = unsafe { gc.realloc(block.as_ptr(), 0) };

    assert_eq!(result, Err(GcError::ZeroSize));
    assert!(gc.contains(block.as_ptr()));
    assert_eq!(heap.frees.get(), 0);

    // Still reclaimable once nothing refers to it.
    assert_eq!(collect_from(&mut gc, &[]), 1);
    assert_eq!(heap.frees.get(), 1);
}

#[test]
fn realloc_moves_the_record() {
    let mut gc = Collector::with_config(config(16));
    let block = gc.alloc(8).unwrap();

    store(block, 0, 0xabcd);

    let old = block.as_ptr() as usize;
    let grown = unsafe { gc.realloc(block.as_ptr(), 4000).unwrap() };

    assert_eq!(gc.live_count(), 1);
    assert_eq!(gc.block_size(grown.as_ptr()), Some(4000));
    assert_eq!(gc.live_bytes(), 4000);
    assert_eq!(unsafe { grown.as_ptr().cast::<usize>().read() }, 0xabcd);

    if grown.as_ptr() as usize != old {
        assert!(!gc.contains(old as *const u8));
    }
}

#[test]
fn realloc_of_null_allocates() {
    let mut gc = Collector::with_config(config(16));
    let block = unsafe { gc.realloc(std::ptr::null_mut(), 12).unwrap() };

    assert_eq!(gc.block_size(block.as_ptr()), Some(16));
}

#[test]
fn failed_realloc_keeps_the_original() {
    let heap = CountingAlloc::default();
    let mut gc = counting_gc(&heap, 16);
    let block = gc.alloc(8).unwrap();

    heap.fail.set(true);

    let result = unsafe { gc.realloc(block.as_ptr(), 64) };

    assert_eq!(result, Err(GcError::OutOfMemory));
    assert_eq!(gc.block_size(block.as_ptr()), Some(8));
}

#[test]
fn free_reclaims_tracked_blocks() {
    let heap = CountingAlloc::default();
    let mut gc = counting_gc(&heap, 16);
    let block = gc.alloc(8).unwrap();

    unsafe { gc.free(block.as_ptr()) };

    assert_eq!(gc.live_count(), 0);
    assert_eq!(gc.live_bytes(), 0);
    assert_eq!(gc.collected_total(), 1);
    assert_eq!(heap.frees.get(), 1);
}

#[test]
fn free_releases_unknown_pointers_anyway() {
    let heap = CountingAlloc::default();
    let mut gc = counting_gc(&heap, 16);
    let foreign = unsafe { SystemAlloc.alloc(16) };

    unsafe {
        gc.free(foreign);
        gc.free(std::ptr::null_mut());
    }

    assert_eq!(heap.frees.get(), 1);
    assert_eq!(gc.collected_total(), 0);
}

#[test]
fn drop_releases_every_block() {
    let heap = CountingAlloc::default();

    {
        let mut gc = counting_gc(&heap, 16);

        for size in 1..=5 {
            gc.alloc(size * 8).unwrap();
        }
    }

    assert_eq!(heap.allocs.get(), 5);
    assert_eq!(heap.frees.get(), 5);
}

#[test]
fn metrics_snapshot() {
    let mut gc = Collector::with_config(config(32));
    let kept = gc.alloc_zeroed(2, 8).unwrap();

    gc.alloc(40).unwrap();
    collect_from(&mut gc, &[kept.as_ptr() as usize]);

    let metrics = gc.metrics();

    assert_eq!(metrics.collections, 1);
    assert_eq!(metrics.collected_total, 1);
    assert_eq!(metrics.live_count, 1);
    assert_eq!(metrics.live_bytes, 16);
    assert_eq!(metrics.capacity, 32);
    assert_eq!(metrics.sweep_threshold, 24);
}

#[test]
fn random_graphs_keep_exactly_the_reachable_blocks() {
    const SLOTS: usize = 4;

    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..20 {
        let mut gc = Collector::with_config(config(4096));
        let n = rng.gen_range(1..200);
        let nodes: Vec<NonNull<u8>> = (0..n)
            .map(|_| gc.alloc_zeroed(SLOTS, WORD).unwrap())
            .collect();
        let mut edges = vec![vec![]; n];

        for (i, node) in nodes.iter().enumerate() {
            for slot in 0..SLOTS {
                if rng.gen_bool(0.3) {
                    let j = rng.gen_range(0..n);

                    store(*node, slot, nodes[j].as_ptr() as usize);
                    edges[i].push(j);
                }
            }
        }

        let root_ids: Vec<usize> = (0..n).filter(|_| rng.gen_bool(0.1)).collect();
        let roots: Vec<usize> = root_ids
            .iter()
            .map(|i| nodes[*i].as_ptr() as usize)
            .collect();

        let mut reachable = vec![false; n];
        let mut work = root_ids.clone();

        while let Some(i) = work.pop() {
            if !reachable[i] {
                reachable[i] = true;
                work.extend(edges[i].iter().copied());
            }
        }

        let expected_live = reachable.iter().filter(|r| **r).count();

        assert_eq!(collect_from(&mut gc, &roots), n - expected_live);
        assert_eq!(gc.live_count(), expected_live);

        for (node, live) in nodes.iter().zip(reachable) {
            assert_eq!(gc.contains(node.as_ptr()), live);
        }
    }
}
