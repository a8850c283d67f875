//! Fixed-size block allocator for pointer blocks and dynamic chunks.
//!
//! Each pointer or dynamic node owns one [`BlockAllocator`]. Every block it
//! hands out has the same size, so freed blocks are reused exactly: a
//! released block goes on the free list and the next allocation pops it
//! (zeroed) before bump-allocating from the segment pool.

use snode_core::AccessError;

use crate::address::Address;
use crate::segment::SegmentList;

/// Allocator of equally sized blocks for one node.
#[derive(Debug)]
pub struct BlockAllocator {
    block_bytes: usize,
    free_list: Vec<Address>,
    live: usize,
    total: usize,
}

impl BlockAllocator {
    /// Allocator of `block_bytes`-sized blocks (at least 8 bytes).
    pub fn new(block_bytes: usize) -> Self {
        Self {
            block_bytes: block_bytes.max(8),
            free_list: Vec::new(),
            live: 0,
            total: 0,
        }
    }

    /// Allocate one zeroed block.
    pub fn alloc(&mut self, segments: &mut SegmentList) -> Result<Address, AccessError> {
        let addr = if let Some(addr) = self.free_list.pop() {
            segments.zero(addr, self.block_bytes);
            addr
        } else {
            let addr = segments.alloc(self.block_bytes)?;
            self.total += 1;
            addr
        };
        self.live += 1;
        Ok(addr)
    }

    /// Return a block for reuse.
    pub fn free(&mut self, addr: Address) {
        debug_assert!(!addr.is_null());
        debug_assert!(self.live > 0);
        self.free_list.push(addr);
        self.live = self.live.saturating_sub(1);
    }

    /// Bytes per block.
    pub fn block_bytes(&self) -> usize {
        self.block_bytes
    }

    /// Blocks currently in use.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Freed blocks waiting for reuse.
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Blocks ever carved from the segment pool.
    pub fn total_blocks(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freed_blocks_are_reused() {
        let mut segs = SegmentList::new(1024, 1);
        let mut a = BlockAllocator::new(24);
        let b1 = a.alloc(&mut segs).unwrap();
        let b2 = a.alloc(&mut segs).unwrap();
        assert_ne!(b1, b2);
        assert_eq!(a.live_count(), 2);

        a.free(b1);
        assert_eq!(a.live_count(), 1);
        assert_eq!(a.free_count(), 1);

        let b3 = a.alloc(&mut segs).unwrap();
        assert_eq!(b3, b1);
        assert_eq!(a.total_blocks(), 2);
        assert_eq!(segs.total_used(), 48);
    }

    #[test]
    fn reused_blocks_are_zeroed() {
        let mut segs = SegmentList::new(1024, 1);
        let mut a = BlockAllocator::new(8);
        let b = a.alloc(&mut segs).unwrap();
        segs.write_u64(b, 99);
        a.free(b);
        let b = a.alloc(&mut segs).unwrap();
        assert_eq!(segs.read_u64(b), 0);
    }

    #[test]
    fn small_blocks_round_up() {
        assert_eq!(BlockAllocator::new(0).block_bytes(), 8);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn live_count_tracks_alloc_and_free(ops in prop::collection::vec(any::<bool>(), 1..64)) {
                let mut segs = SegmentList::new(4096, 4);
                let mut a = BlockAllocator::new(16);
                let mut held = Vec::new();
                for alloc in ops {
                    if alloc || held.is_empty() {
                        held.push(a.alloc(&mut segs).unwrap());
                    } else if let Some(b) = held.pop() {
                        a.free(b);
                    }
                    prop_assert_eq!(a.live_count(), held.len());
                    prop_assert!(a.total_blocks() >= a.live_count());
                }
            }
        }
    }
}
