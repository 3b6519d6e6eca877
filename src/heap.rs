use std::ptr::{self, NonNull};

use crate::{
    block::{Block, DSIZE, MIN_BLOCK_SIZE, WSIZE, pack},
    config::{Config, FitPolicy},
    error::{AllocError, AllocResult},
    source::MemorySource,
    utils::align,
};

/// The internal state of the allocator: the arena it grows through, the head
/// of the explicit free list and the next-fit cursor.
///
/// Blocks are addressed by offsets into the arena (see [`Block`]). The heap
/// always looks like this between two operations:
///
/// ```text
/// +-----+----------+----------+-------+-------+-- ... --+-------+----------+
/// | pad | pro. hdr | pro. ftr | block | block |   ...   | block | epi. hdr |
/// +-----+----------+----------+-------+-------+-- ... --+-------+----------+
///                  ^                                                       ^
///               prologue                                                  brk
/// ```
///
/// The prologue is a permanently allocated, empty block and the epilogue is a
/// zero size allocated header. Neither ever merges with anything, which is
/// what lets the coalescer skip bounds checks.
pub(crate) struct Heap<S> {
    pub(crate) source: S,
    /// Payload offset of the prologue block.
    pub(crate) prologue: Block,
    /// First block of the free list.
    pub(crate) free_head: Option<Block>,
    /// Where the next search starts. Always a member of the free list or `None`.
    pub(crate) cursor: Option<Block>,
    pub(crate) chunk_size: usize,
    pub(crate) policy: FitPolicy,
}

/// Snapshot of the heap obtained by walking every block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes obtained from the memory source, sentinels included.
    pub heap_size: usize,
    /// Blocks between the prologue and the epilogue.
    pub blocks: usize,
    pub allocated_blocks: usize,
    pub free_blocks: usize,
    /// Sum of the sizes of all free blocks, tags included.
    pub free_bytes: usize,
    pub largest_free: usize,
    /// Number of nodes reachable from the free list head.
    pub free_list_len: usize,
}

impl<S: MemorySource> Heap<S> {
    /// Lays down the prologue and epilogue on `source` and extends the heap
    /// by one chunk.
    pub(crate) fn new(mut source: S, config: &Config) -> AllocResult<Self> {
        debug_assert!(
            source.base().as_ptr() as usize % DSIZE == 0,
            "memory source base {:?} is not aligned to {DSIZE}",
            source.base()
        );

        // The payload of every block must land on the alignment unit, so pad
        // whatever the source already handed out to someone else.
        let pad = align(source.brk(), DSIZE) - source.brk();
        let start = source.sbrk(pad + 4 * WSIZE).ok_or_else(|| {
            log::warn!("memory source cannot fit the heap sentinels");
            AllocError::OutOfMemory { requested: pad + 4 * WSIZE }
        })? + pad;

        let mut heap = Self {
            source,
            prologue: Block::at(start + 2 * WSIZE),
            free_head: None,
            cursor: None,
            chunk_size: config.chunk_size(),
            policy: config.fit_policy,
        };

        heap.set_word(start, 0); // Alignment padding
        heap.set_word(start + WSIZE, pack(DSIZE, true)); // Prologue header
        heap.set_word(start + 2 * WSIZE, pack(DSIZE, true)); // Prologue footer
        heap.set_word(start + 3 * WSIZE, pack(0, true)); // Epilogue header

        log::debug!("heap initialised at offset {start}, chunk size {}", heap.chunk_size);

        heap.extend(heap.chunk_size / WSIZE)?;

        Ok(heap)
    }

    /// Reads the word at `offset`.
    #[inline]
    pub(crate) fn word(&self, offset: usize) -> usize {
        debug_assert!(offset % WSIZE == 0 && offset + WSIZE <= self.source.brk());

        // Offsets below the break are owned by the heap and word aligned.
        unsafe { self.source.base().as_ptr().add(offset).cast::<usize>().read() }
    }

    /// Writes the word at `offset`.
    #[inline]
    pub(crate) fn set_word(&mut self, offset: usize, value: usize) {
        debug_assert!(offset % WSIZE == 0 && offset + WSIZE <= self.source.brk());

        unsafe {
            self.source
                .base()
                .as_ptr()
                .add(offset)
                .cast::<usize>()
                .write(value)
        }
    }

    /// Grows the heap by `words` words (rounded up to an even count and to
    /// at least one minimum block), turns the new room into one free block
    /// followed by a fresh epilogue and merges it with a free tail block if
    /// there is one.
    pub(crate) fn extend(&mut self, words: usize) -> AllocResult<Block> {
        let words = words.max(MIN_BLOCK_SIZE / WSIZE);
        let size = words
            .checked_add(words % 2)
            .and_then(|words| words.checked_mul(WSIZE))
            .ok_or(AllocError::OutOfMemory { requested: usize::MAX })?;

        let Some(brk) = self.source.sbrk(size) else {
            log::warn!("memory source exhausted, cannot grow heap by {size} bytes");
            return Err(AllocError::OutOfMemory { requested: size });
        };

        log::debug!("heap grown by {size} bytes, break now at {}", self.source.brk());

        // The old epilogue header becomes the header of the new block.
        let block = Block::at(brk);
        self.write_tags(block, size, false);
        let epilogue = self.next_block(block);
        self.set_word(epilogue.header(), pack(0, true));

        Ok(self.coalesce(block))
    }

    /// Address handed to the caller for `block`.
    #[inline]
    pub(crate) fn pointer(&self, block: Block) -> NonNull<u8> {
        unsafe { self.source.base().add(block.payload()) }
    }

    /// Block owning the payload that starts at `ptr`.
    #[inline]
    pub(crate) fn block_of(&self, ptr: NonNull<u8>) -> Block {
        let offset = (ptr.as_ptr() as usize).wrapping_sub(self.source.base().as_ptr() as usize);

        debug_assert!(
            offset > self.prologue.payload() && offset < self.source.brk(),
            "{ptr:?} does not belong to this heap"
        );

        Block::at(offset)
    }

    /// Copies `len` payload bytes from `from` into `to`.
    ///
    /// **SAFETY**: both blocks must be live, distinct and have at least `len`
    /// payload bytes.
    pub(crate) unsafe fn copy_payload(&mut self, from: Block, to: Block, len: usize) {
        unsafe {
            ptr::copy_nonoverlapping(
                self.pointer(from).as_ptr(),
                self.pointer(to).as_ptr(),
                len,
            );
        }
    }

    /// Walks the heap in address order, from the first block after the
    /// prologue up to (not including) the epilogue.
    pub(crate) fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        let first = self.next_block(self.prologue);

        std::iter::successors(Some(first), |&block| Some(self.next_block(block)))
            .take_while(|&block| self.size(block) > 0)
    }

    pub(crate) fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            heap_size: self.source.brk(),
            free_list_len: self.free_blocks().count(),
            ..HeapStats::default()
        };

        for block in self.blocks() {
            stats.blocks += 1;

            if self.is_allocated(block) {
                stats.allocated_blocks += 1;
            } else {
                let size = self.size(block);
                stats.free_blocks += 1;
                stats.free_bytes += size;
                stats.largest_free = stats.largest_free.max(size);
            }
        }

        stats
    }

    /// Asserts every structural invariant of the heap. Test only.
    #[cfg(test)]
    pub(crate) fn check(&self) {
        use std::collections::HashSet;

        let listed: HashSet<Block> = self.free_blocks().collect();
        assert_eq!(listed.len(), self.free_blocks().count(), "free list has a cycle or duplicate");

        let mut prev_free = false;
        let mut walked_free = 0;

        for block in self.blocks() {
            let size = self.size(block);
            let allocated = self.is_allocated(block);

            assert_eq!(self.word(block.header()), self.word(self.footer(block)), "tags disagree at {block:?}");
            assert_eq!(size % DSIZE, 0, "misaligned size at {block:?}");
            assert!(size >= MIN_BLOCK_SIZE, "undersized block at {block:?}");
            assert_eq!(self.pointer(block).as_ptr() as usize % DSIZE, 0);
            assert_eq!(!allocated, listed.contains(&block), "list membership of {block:?}");
            assert!(!(prev_free && !allocated), "adjacent free blocks at {block:?}");

            prev_free = !allocated;
            walked_free += usize::from(!allocated);
        }

        assert_eq!(walked_free, listed.len());

        if let Some(cursor) = self.cursor {
            assert!(listed.contains(&cursor), "cursor {cursor:?} is not in the free list");
        }

        assert_eq!(self.word(self.source.brk() - WSIZE), pack(0, true), "epilogue is not at the break");
    }
}
