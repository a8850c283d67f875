//! Strongly-typed identifiers, the [`Axis`] type and the [`Index`] alias.

use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Maximum number of distinct axes a tree can index.
pub const MAX_NUM_INDICES: usize = 12;

/// Identifies a node within one tree.
///
/// Node ids are dense arena indices assigned in creation order. The root
/// is always [`NodeId::ROOT`]; ids are only meaningful together with the
/// tree they were issued by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The implicit root of every tree.
    pub const ROOT: Self = Self(0);

    /// Whether this id names the root.
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }

    /// The arena index of this node.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a finalized tree within a runtime.
///
/// `SNodeTreeId(n)` is the n-th tree finalized against that runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SNodeTreeId(pub u32);

impl fmt::Display for SNodeTreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SNodeTreeId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Counter for unique [`RootId`] allocation.
static ROOT_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique handle of a tree root, issued by the registry.
///
/// A root handle exists from the moment a builder is created, long before
/// the tree receives an [`SNodeTreeId`]. Field placements record the root
/// handle so they can be resolved once the tree is finalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(u64);

impl RootId {
    /// Allocate a fresh, never-before-returned root handle. Thread-safe.
    pub fn next() -> Self {
        Self(ROOT_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "root#{}", self.0)
    }
}

/// Counter for unique [`FieldMemberId`] allocation.
static MEMBER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one scalar field member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldMemberId(u64);

impl FieldMemberId {
    /// Allocate a fresh member id. Thread-safe.
    pub fn next() -> Self {
        Self(MEMBER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for FieldMemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A virtual axis of the index space.
///
/// Structural calls name the axes they subdivide. The same axis may be
/// divided at several levels of a tree; the extents multiply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Axis(pub u8);

impl Axis {
    /// Axis 0.
    pub const I: Self = Self(0);
    /// Axis 1.
    pub const J: Self = Self(1);
    /// Axis 2.
    pub const K: Self = Self(2);
    /// Axis 3.
    pub const L: Self = Self(3);
    /// Axes 0 and 1.
    pub const IJ: [Self; 2] = [Self::I, Self::J];
    /// Axes 0, 1 and 2.
    pub const IJK: [Self; 3] = [Self::I, Self::J, Self::K];
    /// Axes 0 through 3.
    pub const IJKL: [Self; 4] = [Self::I, Self::J, Self::K, Self::L];

    /// The axis number as an array index.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether the axis fits below [`MAX_NUM_INDICES`].
    pub fn is_valid(self) -> bool {
        self.index() < MAX_NUM_INDICES
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [char; 4] = ['i', 'j', 'k', 'l'];
        match NAMES.get(self.index()) {
            Some(c) => write!(f, "{c}"),
            None => write!(f, "axis{}", self.0),
        }
    }
}

/// An ordered list of axes declared by one structural call.
pub type Axes = SmallVec<[Axis; 4]>;

/// An index expression into a node's index space.
///
/// Uses `SmallVec<[i32; 4]>` so trees of up to four indices never touch
/// the heap.
pub type Index = SmallVec<[i32; 4]>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_ids_are_unique() {
        let a = RootId::next();
        let b = RootId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn axis_display_uses_letters() {
        assert_eq!(Axis::I.to_string(), "i");
        assert_eq!(Axis::L.to_string(), "l");
        assert_eq!(Axis(7).to_string(), "axis7");
    }

    #[test]
    fn axis_validity_bound() {
        assert!(Axis(11).is_valid());
        assert!(!Axis(12).is_valid());
    }

    #[test]
    fn node_root_sentinel() {
        assert!(NodeId::ROOT.is_root());
        assert!(!NodeId(3).is_root());
    }
}
