//! Contiguous byte segments and growable segment lists.
//!
//! A [`Segment`] is a zero-initialised `Vec<u8>` with bump allocation. A
//! [`SegmentList`] grows into new segments when the current one is full and
//! resolves [`Address`]es to bytes. Allocations are 8-byte aligned and never
//! span segments.

use snode_core::AccessError;

use crate::address::Address;

/// Allocation granularity and alignment.
const ALIGN: usize = 8;

/// A single contiguous byte segment with bump allocation.
pub struct Segment {
    /// Backing storage, allocated to full capacity at creation.
    data: Vec<u8>,
    /// Next free byte.
    cursor: usize,
}

impl Segment {
    /// Create a zeroed segment of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            cursor: 0,
        }
    }

    /// Bump-allocate `len` bytes, returning the starting offset.
    ///
    /// `None` if the segment cannot hold the request. The region is zeroed.
    pub fn alloc(&mut self, len: usize) -> Option<usize> {
        let len = len.checked_next_multiple_of(ALIGN)?;
        let end = self.cursor.checked_add(len)?;
        if end > self.data.len() {
            return None;
        }
        let offset = self.cursor;
        self.data[offset..end].fill(0);
        self.cursor = end;
        Some(offset)
    }

    /// Bytes currently allocated.
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Remaining free bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }
}

/// A growable list of [`Segment`]s.
///
/// When the current segment is full a new one is appended, up to
/// `max_segments`.
pub struct SegmentList {
    segments: Vec<Segment>,
    segment_bytes: usize,
    max_segments: u16,
}

impl SegmentList {
    /// Create a list with one pre-allocated segment.
    pub fn new(segment_bytes: usize, max_segments: u16) -> Self {
        let mut segments = Vec::with_capacity(usize::from(max_segments).min(16));
        segments.push(Segment::new(segment_bytes));
        Self {
            segments,
            segment_bytes,
            max_segments,
        }
    }

    /// Bump-allocate `len` zeroed bytes.
    ///
    /// Fails with [`AccessError::AllocationFailed`] if the request exceeds a
    /// segment or the pool is exhausted.
    pub fn alloc(&mut self, len: usize) -> Result<Address, AccessError> {
        if len > self.segment_bytes {
            return Err(AccessError::AllocationFailed {
                requested: len,
                capacity: self.segment_bytes,
            });
        }
        let current = self.segments.len() - 1;
        if let Some(offset) = self.segments[current].alloc(len) {
            return Ok(Address::new(current as u16, offset as u64));
        }
        if self.segments.len() >= usize::from(self.max_segments) {
            return Err(AccessError::AllocationFailed {
                requested: len,
                capacity: self.capacity_bytes(),
            });
        }
        let mut seg = Segment::new(self.segment_bytes);
        let Some(offset) = seg.alloc(len) else {
            return Err(AccessError::AllocationFailed {
                requested: len,
                capacity: self.segment_bytes,
            });
        };
        self.segments.push(seg);
        tracing::trace!(segments = self.segments.len(), "storage segment added");
        Ok(Address::new((self.segments.len() - 1) as u16, offset as u64))
    }

    /// Bytes at `addr`.
    ///
    /// # Panics
    ///
    /// Panics if the range lies outside the segment.
    pub fn bytes(&self, addr: Address, len: usize) -> &[u8] {
        let start = addr.offset();
        &self.segments[addr.segment()].data[start..start + len]
    }

    /// Mutable bytes at `addr`.
    ///
    /// # Panics
    ///
    /// Panics if the range lies outside the segment.
    pub fn bytes_mut(&mut self, addr: Address, len: usize) -> &mut [u8] {
        let start = addr.offset();
        &mut self.segments[addr.segment()].data[start..start + len]
    }

    /// Zero `len` bytes at `addr`.
    pub fn zero(&mut self, addr: Address, len: usize) {
        self.bytes_mut(addr, len).fill(0);
    }

    /// Little-endian `u64` at `addr`.
    pub fn read_u64(&self, addr: Address) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.bytes(addr, 8));
        u64::from_le_bytes(buf)
    }

    /// Store a little-endian `u64` at `addr`.
    pub fn write_u64(&mut self, addr: Address, v: u64) {
        self.bytes_mut(addr, 8).copy_from_slice(&v.to_le_bytes());
    }

    /// Little-endian `u32` at `addr`.
    pub fn read_u32(&self, addr: Address) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.bytes(addr, 4));
        u32::from_le_bytes(buf)
    }

    /// Store a little-endian `u32` at `addr`.
    pub fn write_u32(&mut self, addr: Address, v: u32) {
        self.bytes_mut(addr, 4).copy_from_slice(&v.to_le_bytes());
    }

    /// Number of segments allocated.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Bytes handed out across all segments.
    pub fn total_used(&self) -> usize {
        self.segments.iter().map(Segment::used).sum()
    }

    /// Memory held by the backing storage in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.segments.iter().map(Segment::capacity).sum()
    }

    fn capacity_bytes(&self) -> usize {
        usize::from(self.max_segments) * self.segment_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_alloc_is_aligned_and_sequential() {
        let mut seg = Segment::new(64);
        assert_eq!(seg.alloc(3), Some(0));
        assert_eq!(seg.alloc(8), Some(8));
        assert_eq!(seg.used(), 16);
        assert_eq!(seg.remaining(), 48);
    }

    #[test]
    fn segment_alloc_fails_when_full() {
        let mut seg = Segment::new(16);
        assert!(seg.alloc(16).is_some());
        assert!(seg.alloc(1).is_none());
    }

    #[test]
    fn list_grows_on_overflow() {
        let mut list = SegmentList::new(64, 4);
        let a = list.alloc(64).unwrap();
        let b = list.alloc(8).unwrap();
        assert_eq!(a.segment(), 0);
        assert_eq!(b.segment(), 1);
        assert_eq!(list.segment_count(), 2);
        assert_eq!(list.total_used(), 72);
    }

    #[test]
    fn list_capacity_exceeded() {
        let mut list = SegmentList::new(64, 1);
        list.alloc(64).unwrap();
        assert!(matches!(
            list.alloc(8),
            Err(AccessError::AllocationFailed { .. })
        ));
    }

    #[test]
    fn oversized_alloc_is_an_error() {
        let mut list = SegmentList::new(64, 4);
        assert!(matches!(
            list.alloc(65),
            Err(AccessError::AllocationFailed {
                requested: 65,
                capacity: 64
            })
        ));
    }

    #[test]
    fn words_round_trip() {
        let mut list = SegmentList::new(64, 1);
        let a = list.alloc(16).unwrap();
        list.write_u64(a, 0xdead_beef);
        list.write_u32(a.add(8), 7);
        assert_eq!(list.read_u64(a), 0xdead_beef);
        assert_eq!(list.read_u32(a.add(8)), 7);
        list.zero(a, 16);
        assert_eq!(list.read_u64(a), 0);
    }
}
