use std::cmp::min;

use utilities::logger::{instrument, tracing};

use crate::namespace::node::BlockId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBoundary {
    pub block_id: BlockId,
    pub index: usize,
    pub start_offset: u64,
    pub end_offset: u64,
}

impl BlockBoundary {
    pub fn len(&self) -> u64 {
        self.end_offset - self.start_offset
    }
}

/// Splits `[0, file_size)` into consecutive blocks of `block_size` bytes, the
/// last one possibly shorter. Every block gets a fresh id.
#[instrument(name = "namenode_get_blocks")]
pub fn get_blocks(file_size: u64, block_size: u64) -> Vec<BlockBoundary> {
    let block_size = block_size.max(1);
    let mut curr_offset: u64 = 0;
    let mut blocks: Vec<BlockBoundary> = vec![];
    while curr_offset < file_size {
        blocks.push(BlockBoundary {
            block_id: uuid::Uuid::new_v4().to_string(),
            index: blocks.len(),
            start_offset: curr_offset,
            end_offset: min(curr_offset + block_size, file_size),
        });
        curr_offset += block_size;
    }
    blocks
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn last_block_holds_the_remainder() {
        let blocks = get_blocks(2500, 1024);
        let lens: Vec<u64> = blocks.iter().map(BlockBoundary::len).collect();
        assert_eq!(lens, vec![1024, 1024, 452]);
        assert_eq!(blocks[2].start_offset, 2048);
        assert_eq!(blocks[2].index, 2);
    }

    #[test]
    fn exact_multiple_has_no_short_block() {
        let blocks = get_blocks(2048, 1024);
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|block| block.len() == 1024));
    }

    #[test]
    fn empty_file_has_no_blocks_and_ids_are_unique() {
        assert!(get_blocks(0, 1024).is_empty());
        let ids: HashSet<BlockId> = get_blocks(10_000, 10)
            .into_iter()
            .map(|block| block.block_id)
            .collect();
        assert_eq!(ids.len(), 1000);
    }
}
