use std::{ptr::NonNull, slice};

use tagalloc::{ALIGNMENT, AllocError, ArenaMemory, Config, FitPolicy, MemorySource, TagAlloc};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn arena(capacity: usize) -> TagAlloc<ArenaMemory> {
    init_logger();
    TagAlloc::with_source(ArenaMemory::new(capacity), Config::default()).unwrap()
}

fn alloc<S: MemorySource>(heap: &mut TagAlloc<S>, size: usize) -> NonNull<u8> {
    heap.allocate(size).unwrap().expect("non zero request")
}

unsafe fn fill(ptr: NonNull<u8>, len: usize) {
    for i in 0..len {
        unsafe { ptr.as_ptr().add(i).write((i % 251) as u8) };
    }
}

unsafe fn holds_pattern(ptr: NonNull<u8>, len: usize) -> bool {
    let bytes = unsafe { slice::from_raw_parts(ptr.as_ptr(), len) };
    bytes.iter().enumerate().all(|(i, &b)| b == (i % 251) as u8)
}

#[test]
fn zero_size_is_a_no_op() {
    let mut heap = arena(1 << 16);
    let before = heap.stats();

    let ptr = heap.allocate(0).unwrap();
    assert_eq!(ptr, None);

    unsafe { heap.free(ptr) };
    assert_eq!(heap.stats(), before);
}

#[test]
fn live_allocations_are_aligned_and_disjoint() {
    let mut heap = arena(1 << 20);
    let sizes = [1, 7, 8, 15, 16, 17, 31, 32, 33, 100, 255, 1000, 4000, 5000];

    let mut spans: Vec<(usize, usize)> = sizes
        .iter()
        .map(|&size| {
            let ptr = alloc(&mut heap, size);
            assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
            (ptr.as_ptr() as usize, size)
        })
        .collect();

    spans.sort_unstable();
    for pair in spans.windows(2) {
        assert!(pair[0].0 + pair[0].1 <= pair[1].0, "{pair:?} overlap");
    }
}

#[test]
fn freed_space_is_reused_instead_of_growing() {
    let mut heap = arena(1 << 16);

    let first = alloc(&mut heap, 100);
    let _second = alloc(&mut heap, 200);
    let size = heap.heap_size();

    unsafe { heap.free(Some(first)) };
    let _third = alloc(&mut heap, 50);

    assert_eq!(heap.heap_size(), size);
    assert_eq!(heap.stats().allocated_blocks, 2);
}

#[test]
fn first_fit_reuses_the_freed_block_itself() {
    init_logger();
    let config = Config::default().with_fit_policy(FitPolicy::FirstFit);
    let mut heap = TagAlloc::with_source(ArenaMemory::new(1 << 16), config).unwrap();

    let first = alloc(&mut heap, 100);
    let _second = alloc(&mut heap, 200);

    unsafe { heap.free(Some(first)) };
    let third = alloc(&mut heap, 50);

    assert_eq!(third, first);
}

#[test]
fn adjacent_frees_merge() {
    let mut heap = arena(1 << 16);

    let a = alloc(&mut heap, 1000);
    let b = alloc(&mut heap, 1000);
    let rest = heap.stats().largest_free;
    let _tail = alloc(&mut heap, rest - ALIGNMENT);
    assert_eq!(heap.stats().free_blocks, 0);

    let size = heap.heap_size();
    let (a_usable, b_usable) = unsafe { (heap.usable_size(a), heap.usable_size(b)) };

    unsafe {
        heap.free(Some(a));
        heap.free(Some(b));
    }

    let stats = heap.stats();
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.free_list_len, 1);
    assert_eq!(stats.largest_free, a_usable + b_usable + 2 * ALIGNMENT);

    // Fits neither half on its own.
    let merged = alloc(&mut heap, a_usable + 100);
    assert_eq!(merged, a);
    assert_eq!(heap.heap_size(), size);
}

#[test]
fn grow_reallocation_keeps_content() {
    let mut heap = arena(1 << 16);
    let ptr = alloc(&mut heap, 100);

    unsafe {
        fill(ptr, 100);
        let _blocker = alloc(&mut heap, 10);

        let new = heap.reallocate(Some(ptr), 1000).unwrap().unwrap();
        assert!(holds_pattern(new, 100));
        assert!(heap.usable_size(new) >= 1000);
    }
}

#[test]
fn shrink_reallocation_keeps_prefix_and_is_freeable() {
    let mut heap = arena(1 << 16);
    let ptr = alloc(&mut heap, 1000);

    unsafe {
        fill(ptr, 1000);

        let new = heap.reallocate(Some(ptr), 40).unwrap().unwrap();
        assert!(holds_pattern(new, 40));

        heap.free(Some(new));
    }

    let stats = heap.stats();
    assert_eq!(stats.allocated_blocks, 0);
    assert_eq!(stats.free_blocks, 1);
}

#[test]
fn reallocate_follows_realloc_conventions() {
    let mut heap = arena(1 << 16);

    let ptr = unsafe { heap.reallocate(None, 24) }.unwrap();
    assert!(ptr.is_some());

    let gone = unsafe { heap.reallocate(ptr, 0) }.unwrap();
    assert_eq!(gone, None);
    assert_eq!(heap.stats().allocated_blocks, 0);
}

#[test]
fn steady_state_cycles_do_not_grow_the_heap() {
    let mut heap = arena(1 << 16);

    let first = alloc(&mut heap, 16);
    unsafe { heap.free(Some(first)) };
    let size = heap.heap_size();

    for _ in 0..10_000 {
        let ptr = alloc(&mut heap, 16);
        unsafe { heap.free(Some(ptr)) };
    }

    assert_eq!(heap.heap_size(), size);
    assert_eq!(heap.stats().free_blocks, 1);
}

#[test]
fn batches_are_recycled() {
    let mut heap = arena(1 << 20);

    for _ in 0..50 {
        let ptrs: Vec<_> = (1..=64).map(|i| alloc(&mut heap, i * 8)).collect();
        for ptr in ptrs {
            unsafe { heap.free(Some(ptr)) };
        }
    }

    let stats = heap.stats();
    assert_eq!(stats.blocks, 1);
    assert!(heap.heap_size() < 1 << 16);
}

#[test]
fn out_of_memory_is_recoverable() {
    let mut heap = arena(1 << 14);
    let mut ptrs = Vec::new();

    let err = loop {
        match heap.allocate(1000) {
            Ok(ptr) => ptrs.push(ptr),
            Err(err) => break err,
        }
    };
    assert!(matches!(err, AllocError::OutOfMemory { .. }));
    assert!(!ptrs.is_empty());

    unsafe { heap.free(ptrs.pop().unwrap()) };
    assert!(heap.allocate(1000).unwrap().is_some());
}

#[test]
fn system_memory_backed_heap() {
    init_logger();
    let mut heap = TagAlloc::with_config(Config::default().with_max_heap(1 << 20)).unwrap();

    let ptr = alloc(&mut heap, 512);
    unsafe {
        fill(ptr, 512);
        assert!(holds_pattern(ptr, 512));
        heap.free(Some(ptr));
    }

    assert!(heap.source().capacity() >= 1 << 20);
}

#[test]
fn oversized_configuration_fails_without_panicking() {
    init_logger();

    let chunk = Config::default().with_chunk_size(usize::MAX);
    assert!(matches!(
        TagAlloc::with_source(ArenaMemory::new(1 << 16), chunk),
        Err(AllocError::OutOfMemory { .. })
    ));

    let heap = Config::default().with_max_heap(usize::MAX);
    assert!(matches!(TagAlloc::with_config(heap), Err(AllocError::OutOfMemory { .. })));
}
