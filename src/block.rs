//! Block layout and boundary tags.
//!
//! Every block is bracketed by two identical tag words. A tag packs the block
//! size (a multiple of [`DSIZE`]) with the allocated bit in its low bit:
//!
//! ```text
//!            +---------------------+ <------+
//!            |  size | allocated   |        | -> Header (one word)
//! payload -> +---------------------+ <------+
//!            |                     |        |
//!            |       Payload       |        | -> Owned by the caller while allocated,
//!            |         ...         |        |    holds the free list links while free
//!            |                     |        |
//!            +---------------------+ <------+
//!            |  size | allocated   |        | -> Footer (one word)
//!            +---------------------+ <------+
//! ```
//!
//! The footer is what makes walking backwards O(1): the word right before a
//! header is the footer of the physical predecessor.

use crate::{heap::Heap, source::MemorySource, utils::checked_align};

/// Word size. Headers and footers are one word each.
pub(crate) const WSIZE: usize = size_of::<usize>();

/// Double word size. This is the alignment unit for block sizes and payloads.
pub(crate) const DSIZE: usize = 2 * WSIZE;

/// Smallest block that can still hold both tags and both free list links.
pub(crate) const MIN_BLOCK_SIZE: usize = 2 * DSIZE;

/// Default amount of bytes the heap is extended by when no block fits.
pub(crate) const CHUNK_SIZE: usize = 1 << 12;

const ALLOCATED: usize = 0x1;

/// Pack a size and allocated bit into a tag word.
#[inline]
pub(crate) const fn pack(size: usize, allocated: bool) -> usize {
    size | allocated as usize
}

#[inline]
pub(crate) const fn tag_size(tag: usize) -> usize {
    tag & !0x7
}

#[inline]
pub(crate) const fn tag_allocated(tag: usize) -> bool {
    tag & ALLOCATED != 0
}

/// Block size needed to serve a request of `n` payload bytes: room for both
/// tags, rounded up to the alignment unit and never below [`MIN_BLOCK_SIZE`].
/// `None` if that size does not fit in a `usize`.
pub(crate) fn adjusted_size(n: usize) -> Option<usize> {
    if n <= DSIZE {
        return Some(MIN_BLOCK_SIZE);
    }

    checked_align(n.checked_add(DSIZE)?, DSIZE)
}

/// A block, named by the arena offset of its payload.
///
/// Offset `0` is the alignment padding word of the heap and never names a
/// block, so it doubles as the "no block" value inside free list links.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Block(usize);

impl Block {
    #[inline]
    pub(crate) const fn at(payload: usize) -> Self {
        Self(payload)
    }

    /// Offset of the payload inside the arena.
    #[inline]
    pub(crate) const fn payload(self) -> usize {
        self.0
    }

    /// Offset of the header word.
    #[inline]
    pub(crate) const fn header(self) -> usize {
        self.0 - WSIZE
    }
}

impl<S: MemorySource> Heap<S> {
    #[inline]
    pub(crate) fn size(&self, block: Block) -> usize {
        tag_size(self.word(block.header()))
    }

    #[inline]
    pub(crate) fn is_allocated(&self, block: Block) -> bool {
        tag_allocated(self.word(block.header()))
    }

    /// Offset of the footer word, derived from the size in the header.
    #[inline]
    pub(crate) fn footer(&self, block: Block) -> usize {
        block.payload() + self.size(block) - DSIZE
    }

    /// Physical successor.
    #[inline]
    pub(crate) fn next_block(&self, block: Block) -> Block {
        Block::at(block.payload() + self.size(block))
    }

    /// Physical predecessor, found through its footer.
    #[inline]
    pub(crate) fn prev_block(&self, block: Block) -> Block {
        Block::at(block.payload() - tag_size(self.word(block.payload() - DSIZE)))
    }

    /// Whether the block right before `block` is allocated, read from its footer.
    #[inline]
    pub(crate) fn prev_allocated(&self, block: Block) -> bool {
        tag_allocated(self.word(block.payload() - DSIZE))
    }

    /// Writes header and footer. The footer position follows from `size`.
    #[inline]
    pub(crate) fn write_tags(&mut self, block: Block, size: usize, allocated: bool) {
        let tag = pack(size, allocated);
        self.set_word(block.header(), tag);
        self.set_word(block.payload() + size - DSIZE, tag);
    }

    /// Payload bytes available to the caller.
    #[inline]
    pub(crate) fn payload_size(&self, block: Block) -> usize {
        self.size(block) - DSIZE
    }
}
