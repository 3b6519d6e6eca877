//! Memory sources: the primitive the heap grows through.
//!
//! A source hands out one contiguous range, front to back, in the style of
//! `sbrk(2)`. Every offset the allocator works with is relative to
//! [`MemorySource::base`], which must not move for the lifetime of the source.
//!
//! ```text
//!  base                           brk                        capacity
//!   |                              |                              |
//!   +------------------------------+------------------------------+
//!   |      owned by the heap       |       not handed out yet     |
//!   +------------------------------+------------------------------+
//! ```

use std::ptr::NonNull;

use crate::{
    error::{AllocError, AllocResult},
    kernel,
};

/// The heap growth primitive.
pub trait MemorySource {
    /// Start of the range. Stable for as long as the source lives and aligned
    /// to at least 16 bytes, the largest alignment unit the heap uses.
    fn base(&self) -> NonNull<u8>;

    /// Number of bytes handed out so far.
    fn brk(&self) -> usize;

    /// Extends the range by exactly `increment` bytes and returns the offset
    /// of the previous break, or `None` if the source is exhausted. A failed
    /// call leaves the break untouched.
    fn sbrk(&mut self, increment: usize) -> Option<usize>;
}

/// Bumps `brk` by `increment` as long as the result stays within `capacity`.
fn bump(brk: &mut usize, capacity: usize, increment: usize) -> Option<usize> {
    let old = *brk;
    let new = old.checked_add(increment).filter(|&new| new <= capacity)?;
    *brk = new;

    Some(old)
}

/// Source backed by a single reservation obtained from the operating system
/// (`mmap` on unix, `VirtualAlloc` on windows). The whole reservation is
/// returned to the kernel on drop.
pub struct SystemMemory {
    base: NonNull<u8>,
    capacity: usize,
    brk: usize,
}

impl SystemMemory {
    /// Reserves room for a heap of at most `max_heap` bytes.
    pub fn reserve(max_heap: usize) -> AllocResult<Self> {
        let (base, capacity) = kernel::reserve(max_heap).ok_or_else(|| {
            log::warn!("kernel refused to reserve {max_heap} bytes");
            AllocError::OutOfMemory { requested: max_heap }
        })?;

        Ok(Self { base, capacity, brk: 0 })
    }

    /// Size of the reservation in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl MemorySource for SystemMemory {
    fn base(&self) -> NonNull<u8> {
        self.base
    }

    fn brk(&self) -> usize {
        self.brk
    }

    fn sbrk(&mut self, increment: usize) -> Option<usize> {
        bump(&mut self.brk, self.capacity, increment)
    }
}

impl Drop for SystemMemory {
    fn drop(&mut self) {
        unsafe { kernel::release(self.base, self.capacity) }
    }
}

/// One alignment unit worth of storage. Keeps the arena base aligned for
/// every block payload on both 32 and 64 bit targets.
#[derive(Clone, Copy)]
#[repr(C, align(16))]
struct Chunk([u8; 16]);

/// Source backed by an owned, fixed capacity arena. Deterministic and free of
/// syscalls, which makes it the source of choice for tests.
pub struct ArenaMemory {
    chunks: NonNull<[Chunk]>,
    brk: usize,
}

impl ArenaMemory {
    /// Creates an arena that can hand out up to `capacity` bytes (rounded up
    /// to the alignment unit).
    pub fn new(capacity: usize) -> Self {
        let len = capacity.div_ceil(size_of::<Chunk>());
        let chunks = vec![Chunk([0; 16]); len].into_boxed_slice();

        Self {
            chunks: NonNull::from(Box::leak(chunks)),
            brk: 0,
        }
    }

    /// Total number of bytes the arena can hand out.
    pub fn capacity(&self) -> usize {
        self.chunks.len() * size_of::<Chunk>()
    }
}

impl MemorySource for ArenaMemory {
    fn base(&self) -> NonNull<u8> {
        self.chunks.cast::<u8>()
    }

    fn brk(&self) -> usize {
        self.brk
    }

    fn sbrk(&mut self, increment: usize) -> Option<usize> {
        let capacity = self.capacity();
        bump(&mut self.brk, capacity, increment)
    }
}

impl Drop for ArenaMemory {
    fn drop(&mut self) {
        // The slice was leaked from a `Box` in `new` and is reclaimed exactly once.
        drop(unsafe { Box::from_raw(self.chunks.as_ptr()) });
    }
}
