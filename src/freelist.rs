//! Explicit free list.
//!
//! An unordered doubly linked list of every free [`Block`]. There is no
//! separate storage for the nodes: as the block is free, the only part of it
//! that matters is its tags, so the first two payload words are borrowed to
//! hold the links.
//!
//! ```text
//! +------------------------+ <--------+
//! |         Header         |          | -> size | 0
//! +------------------------+ <--------+
//! |          pred          |          |
//! +------------------------+          | -> Links (offsets, 0 means none)
//! |          succ          |          |
//! +------------------------+ <--------+
//! |   Unused payload ...   |
//! +------------------------+
//! |         Footer         |
//! +------------------------+
//! ```
//!
//! This module is the only place where payload bytes are read or written as
//! links. Everything else goes through [`Heap::list_add`], [`Heap::list_remove`]
//! and [`Heap::successor`].

use crate::{
    block::{Block, WSIZE},
    heap::Heap,
    source::MemorySource,
};

#[inline]
fn encode(link: Option<Block>) -> usize {
    link.map_or(0, Block::payload)
}

#[inline]
fn decode(word: usize) -> Option<Block> {
    (word != 0).then(|| Block::at(word))
}

impl<S: MemorySource> Heap<S> {
    #[inline]
    fn pred(&self, block: Block) -> Option<Block> {
        debug_assert!(!self.is_allocated(block), "links read from allocated {block:?}");
        decode(self.word(block.payload()))
    }

    #[inline]
    fn succ(&self, block: Block) -> Option<Block> {
        debug_assert!(!self.is_allocated(block), "links read from allocated {block:?}");
        decode(self.word(block.payload() + WSIZE))
    }

    #[inline]
    fn set_pred(&mut self, block: Block, pred: Option<Block>) {
        debug_assert!(!self.is_allocated(block), "links written into allocated {block:?}");
        self.set_word(block.payload(), encode(pred));
    }

    #[inline]
    fn set_succ(&mut self, block: Block, succ: Option<Block>) {
        debug_assert!(!self.is_allocated(block), "links written into allocated {block:?}");
        self.set_word(block.payload() + WSIZE, encode(succ));
    }

    /// Next node of the free list after `block`.
    #[inline]
    pub(crate) fn successor(&self, block: Block) -> Option<Block> {
        self.succ(block)
    }

    /// Pushes `block` at the head of the list. The block must already be
    /// tagged as free.
    pub(crate) fn list_add(&mut self, block: Block) {
        let head = self.free_head;

        self.set_pred(block, None);
        self.set_succ(block, head);

        if let Some(head) = head {
            self.set_pred(head, Some(block));
        }

        self.free_head = Some(block);
    }

    /// Unlinks `block` using its own links. The block must still be tagged
    /// as free.
    pub(crate) fn list_remove(&mut self, block: Block) {
        let pred = self.pred(block);
        let succ = self.succ(block);

        match pred {
            Some(pred) => self.set_succ(pred, succ),
            None => self.free_head = succ,
        }

        if let Some(succ) = succ {
            self.set_pred(succ, pred);
        }
    }

    /// Iterates the free list from its head.
    pub(crate) fn free_blocks(&self) -> impl Iterator<Item = Block> + '_ {
        std::iter::successors(self.free_head, |&block| self.succ(block))
    }
}
