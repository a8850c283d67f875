//! Addresses into a tree's storage pool.
//!
//! An [`Address`] packs a segment index and a byte offset into one `u64`
//! so it can be stored inside pointer slots and dynamic chunk links. Zero is
//! the null address: segment numbers are stored biased by one.

use std::fmt;

use snode_core::SNodeTreeId;

/// Bits of the byte offset within a segment.
pub const OFFSET_BITS: u32 = 40;

/// Bits of the biased segment number.
pub const SEGMENT_BITS: u32 = 8;

/// Largest segment whose offsets fit in [`OFFSET_BITS`].
pub const MAX_SEGMENT_BYTES: u64 = 1 << OFFSET_BITS;

/// Largest supported number of segments per pool.
pub const MAX_SEGMENTS: u16 = (1 << SEGMENT_BITS) - 1;

const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;
const SEGMENT_MASK: u64 = (1 << SEGMENT_BITS) - 1;
const TREE_SHIFT: u32 = OFFSET_BITS + SEGMENT_BITS;

/// Location of a byte within a tree's storage pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[must_use]
pub struct Address(u64);

impl Address {
    /// The null address.
    pub const NULL: Self = Self(0);

    /// Address of byte `offset` of segment `segment`.
    pub(crate) fn new(segment: u16, offset: u64) -> Self {
        debug_assert!(segment < MAX_SEGMENTS);
        debug_assert!(offset <= OFFSET_MASK);
        Self(((u64::from(segment) + 1) << OFFSET_BITS) | (offset & OFFSET_MASK))
    }

    /// Reinterpret a stored word.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The stored word.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Whether this is the null address.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Segment index. Meaningless for the null address.
    pub fn segment(self) -> usize {
        (((self.0 >> OFFSET_BITS) & SEGMENT_MASK) as usize).saturating_sub(1)
    }

    /// Byte offset within the segment.
    pub fn offset(self) -> usize {
        (self.0 & OFFSET_MASK) as usize
    }

    /// The address `bytes` further into the same segment.
    pub fn add(self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }

    /// Tag with the owning tree so addresses of different trees never
    /// collide.
    pub fn global(self, tree: SNodeTreeId) -> u64 {
        ((u64::from(tree.0) + 1) << TREE_SHIFT) | self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("null")
        } else {
            write!(f, "{}:{:#x}", self.segment(), self.offset())
        }
    }
}
