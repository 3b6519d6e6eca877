use crate::{block::Block, heap::Heap, source::MemorySource};

impl<S: MemorySource> Heap<S> {
    /// Merges the freshly freed `block` with whichever physical neighbours
    /// are free, pushes the result onto the free list and returns it.
    ///
    /// `block` must already be tagged as free and must not be on the list.
    /// The prologue and epilogue are always allocated, so both neighbours
    /// exist.
    ///
    /// ```text
    ///   prev    block    next             merged
    /// +------+--------+------+     +----------------------+
    /// | free |  free  | free | --> |         free         |
    /// +------+--------+------+     +----------------------+
    /// ```
    pub(crate) fn coalesce(&mut self, block: Block) -> Block {
        let next = self.next_block(block);
        let prev_allocated = self.prev_allocated(block);
        let next_allocated = self.is_allocated(next);
        let mut size = self.size(block);

        let merged = match (prev_allocated, next_allocated) {
            (true, true) => {
                log::trace!("coalesce {block:?}: no free neighbours");
                block
            }
            (true, false) => {
                log::trace!("coalesce {block:?}: absorbing next {next:?}");

                self.list_remove(next);
                size += self.size(next);
                self.write_tags(block, size, false);
                block
            }
            (false, true) => {
                let prev = self.prev_block(block);
                log::trace!("coalesce {block:?}: absorbed by prev {prev:?}");

                self.list_remove(prev);
                size += self.size(prev);
                self.write_tags(prev, size, false);
                prev
            }
            (false, false) => {
                let prev = self.prev_block(block);
                log::trace!("coalesce {block:?}: absorbed by prev {prev:?} along with next {next:?}");

                self.list_remove(prev);
                self.list_remove(next);
                size += self.size(prev) + self.size(next);
                self.write_tags(prev, size, false);
                prev
            }
        };

        // The cursor may name an address that is no longer the start of a
        // free block.
        if self.cursor.is_some_and(|cursor| cursor == block || cursor == next) {
            self.cursor = Some(merged);
        }

        self.list_add(merged);
        merged
    }
}
