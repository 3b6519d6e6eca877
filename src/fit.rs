use crate::{
    block::{Block, MIN_BLOCK_SIZE},
    config::FitPolicy,
    heap::Heap,
    source::MemorySource,
};

impl<S: MemorySource> Heap<S> {
    /// Returns a free block of at least `size` bytes, searched according to
    /// the configured [`FitPolicy`].
    pub(crate) fn find_fit(&mut self, size: usize) -> Option<Block> {
        match self.policy {
            FitPolicy::NextFit => self.next_fit(size),
            FitPolicy::FirstFit => self.first_fit(size),
        }
    }

    /// Scans the free list from the cursor to its end, then from the head up
    /// to where it started.
    fn next_fit(&mut self, size: usize) -> Option<Block> {
        if self.cursor.is_none() {
            self.cursor = self.free_head;
        }
        let start = self.cursor;

        let mut current = start;
        while let Some(block) = current {
            if self.size(block) >= size {
                return Some(block);
            }
            current = self.successor(block);
        }

        let mut current = self.free_head;
        while current != start {
            let block = current?;
            if self.size(block) >= size {
                return Some(block);
            }
            current = self.successor(block);
        }

        None
    }

    fn first_fit(&self, size: usize) -> Option<Block> {
        self.free_blocks().find(|&block| self.size(block) >= size)
    }

    /// Allocates `size` bytes at the start of the free `block`.
    ///
    /// If what is left is big enough to stand on its own it is split off,
    /// goes back to the free list and the cursor moves onto it. Otherwise
    /// the whole block is handed out and the cursor moves to the list
    /// successor `block` had.
    pub(crate) fn place(&mut self, block: Block, size: usize) {
        let block_size = self.size(block);
        let successor = self.successor(block);

        self.list_remove(block);

        if block_size - size >= MIN_BLOCK_SIZE {
            self.write_tags(block, size, true);

            let rest = self.next_block(block);
            self.write_tags(rest, block_size - size, false);
            self.list_add(rest);

            log::trace!("place {size} bytes at {block:?}, {} split off at {rest:?}", block_size - size);

            self.cursor = Some(rest);
        } else {
            self.write_tags(block, block_size, true);

            log::trace!("place {size} bytes at {block:?}, whole block of {block_size}");

            self.cursor = successor.or(self.free_head);
        }
    }
}
