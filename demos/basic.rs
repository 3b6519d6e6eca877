use tagalloc::TagAlloc;

fn log_alloc(addr: *mut u8, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?}");
}

fn main() -> Result<(), tagalloc::AllocError> {
    let mut allocator = TagAlloc::new()?;

    let addr1 = allocator.allocate(size_of::<u64>())?;
    log_alloc(addr1.map_or(std::ptr::null_mut(), |p| p.as_ptr()), size_of::<u64>());

    let addr2 = allocator.allocate(8)?;
    log_alloc(addr2.map_or(std::ptr::null_mut(), |p| p.as_ptr()), 8);

    let addr3 = allocator.allocate(16)?;
    log_alloc(addr3.map_or(std::ptr::null_mut(), |p| p.as_ptr()), 16);

    unsafe {
        allocator.free(addr1);
        allocator.free(addr2);
        allocator.free(addr3);
    }

    println!("{:#?}", allocator.stats());

    Ok(())
}
