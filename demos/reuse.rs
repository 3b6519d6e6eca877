//! Walks through free list reuse and coalescing on a small arena.

use tagalloc::{ArenaMemory, Config, TagAlloc};

fn main() -> Result<(), tagalloc::AllocError> {
    let mut allocator = TagAlloc::with_source(ArenaMemory::new(1 << 16), Config::from_env())?;

    println!("Heap size after init: {}", allocator.heap_size());

    // Merge example
    let a = allocator.allocate(64)?;
    let b = allocator.allocate(64)?;
    let _c = allocator.allocate(64)?;

    unsafe {
        allocator.free(a);
        allocator.free(b);
    }
    println!("After freeing a and b: {:?}", allocator.stats());

    let d = allocator.allocate(128)?;
    if d == a {
        println!("Correctly reused at {:?}", d);
    } else {
        println!("Not reused. A was at {:?} and D is at {:?}", a, d);
    }

    // Steady state: the heap must not grow.
    let before = allocator.heap_size();
    for _ in 0..1000 {
        let p = allocator.allocate(16)?;
        unsafe { allocator.free(p) };
    }
    println!("Heap grew by {} bytes over 1000 cycles", allocator.heap_size() - before);

    Ok(())
}
