//! # tagalloc - A boundary tag allocator
//!
//! User space allocator that manages one growable heap. Blocks carry a header
//! and a footer (boundary tags), free blocks are chained in an explicit,
//! unordered, doubly linked free list and searched next-fit style, and
//! physically adjacent free blocks are merged as soon as they appear.
//!
//! ```text
//!                                  Free List
//!                 +--------------------------------------------+
//!                 |                                            |
//! +-----+-----+---|--+-------+-------+------+-------+------+---|--+-----+
//! | pad | pro | Free | Alloc | Alloc | Free | Alloc | Free | Free | epi |
//! +-----+-----+------+-------+-------+--|---+-------+--|---+------+-----+
//!                                       |              |
//!                                       +--------------+
//! ```
//!
//! (The last two free blocks in the picture could never coexist: they would
//! have been merged.)
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{ArenaMemory, Config, TagAlloc};
//!
//! let mut heap = TagAlloc::with_source(ArenaMemory::new(1 << 16), Config::default()).unwrap();
//!
//! let ptr = heap.allocate(100).unwrap().unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(0xAB, 100);
//!     let ptr = heap.reallocate(Some(ptr), 200).unwrap();
//!     heap.free(ptr);
//! }
//! ```
//!
//! ## Safety
//!
//! Freeing a pointer twice, freeing a pointer that this allocator did not
//! hand out, or writing outside of a payload is undefined behaviour, the same
//! as with `malloc(3)`. Debug builds catch some of it with assertions.
//!
//! The allocator is single threaded: [`TagAlloc`] is neither `Send` nor `Sync`.

mod block;
mod coalesce;
mod config;
mod error;
mod fit;
mod freelist;
mod heap;
mod kernel;
mod source;
mod utils;

use std::ptr::NonNull;

use crate::{
    block::{WSIZE, adjusted_size},
    heap::Heap,
};

pub use crate::{
    config::{Config, FitPolicy, MAX_HEAP},
    error::{AllocError, AllocResult},
    heap::HeapStats,
    source::{ArenaMemory, MemorySource, SystemMemory},
};

/// Every payload handed out is aligned to this many bytes.
pub const ALIGNMENT: usize = block::DSIZE;

/// Boundary tag allocator over a [`MemorySource`].
pub struct TagAlloc<S: MemorySource = SystemMemory> {
    heap: Heap<S>,
}

impl TagAlloc<SystemMemory> {
    /// Allocator over an operating system reservation sized by
    /// [`Config::default`].
    pub fn new() -> AllocResult<Self> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> AllocResult<Self> {
        let source = SystemMemory::reserve(config.max_heap)?;
        Self::with_source(source, config)
    }
}

impl<S: MemorySource> TagAlloc<S> {
    /// Lays the heap out on `source` and grows it by one chunk.
    pub fn with_source(source: S, config: Config) -> AllocResult<Self> {
        Ok(Self {
            heap: Heap::new(source, &config)?,
        })
    }

    /// Allocates at least `size` bytes aligned to [`ALIGNMENT`].
    ///
    /// A zero size request allocates nothing and returns `Ok(None)`.
    pub fn allocate(&mut self, size: usize) -> AllocResult<Option<NonNull<u8>>> {
        if size == 0 {
            return Ok(None);
        }

        let asize = adjusted_size(size).ok_or(AllocError::OutOfMemory { requested: size })?;

        let block = match self.heap.find_fit(asize) {
            Some(block) => block,
            None => {
                let extend = asize.max(self.heap.chunk_size);
                self.heap.extend(extend / WSIZE)?
            }
        };

        self.heap.place(block, asize);

        Ok(Some(self.heap.pointer(block)))
    }

    /// Gives the block behind `ptr` back to the heap. `None` is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator and not freed since.
    pub unsafe fn free(&mut self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else { return };

        let block = self.heap.block_of(ptr);
        debug_assert!(self.heap.is_allocated(block), "double free of {ptr:?}");

        let size = self.heap.size(block);
        self.heap.write_tags(block, size, false);
        self.heap.coalesce(block);
    }

    /// Moves the allocation behind `ptr` into a fresh block of `size` bytes,
    /// keeping as much of its content as fits.
    ///
    /// `None` behaves like [`TagAlloc::allocate`] and a zero `size` frees
    /// `ptr` and returns `Ok(None)`. If the new block cannot be obtained the
    /// old one is left as it was.
    ///
    /// # Safety
    ///
    /// Same as [`TagAlloc::free`].
    pub unsafe fn reallocate(
        &mut self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> AllocResult<Option<NonNull<u8>>> {
        let Some(old) = ptr else {
            return self.allocate(size);
        };

        if size == 0 {
            unsafe { self.free(Some(old)) };
            return Ok(None);
        }

        let Some(new) = self.allocate(size)? else {
            return Ok(None);
        };

        let from = self.heap.block_of(old);
        let to = self.heap.block_of(new);
        let len = self.heap.payload_size(from).min(size);

        unsafe {
            self.heap.copy_payload(from, to, len);
            self.free(Some(old));
        }

        Ok(Some(new))
    }

    /// Number of payload bytes behind `ptr`. At least what was requested.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live allocation of this allocator.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        self.heap.payload_size(self.heap.block_of(ptr))
    }

    /// Bytes obtained from the memory source so far.
    pub fn heap_size(&self) -> usize {
        self.heap.source.brk()
    }

    /// Walks the whole heap. Linear in the number of blocks.
    pub fn stats(&self) -> HeapStats {
        self.heap.stats()
    }

    pub fn source(&self) -> &S {
        &self.heap.source
    }
}
