//! Per-kind payload of a node.

use smallvec::SmallVec;
use snode_core::{Axes, Axis, FieldMember, Index, SNodeType};

/// Declared extents, one per axis of the structural call.
pub type Extents = SmallVec<[u32; 4]>;

/// Shared-exponent membership of a quantized-float place node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SharedExponent {
    /// Group number, unique within the enclosing `bit_struct`.
    pub group: u32,
    /// Bit offset of the group's exponent field within the word.
    pub exponent_bit_offset: u32,
    /// Width of the exponent field.
    pub exponent_bits: u32,
    /// Whether this member was the first of its group.
    pub owner: bool,
}

/// Data carried by a place node.
#[derive(Clone, Debug)]
pub struct PlaceInfo {
    /// The member bound to this leaf.
    pub member: FieldMember,
    /// Offset added to each index before addressing, one per active index.
    ///
    /// Empty when the placement was made without offsets.
    pub index_offsets: Index,
    /// Position of the member's bits inside the enclosing bit container.
    pub bit_offset: Option<u32>,
    /// Present when the member shares its exponent with siblings.
    pub shared_exponent: Option<SharedExponent>,
}

/// Kind of a node together with the parameters it was declared with.
#[derive(Clone, Debug)]
pub enum SNodeKind {
    /// The implicit root.
    Root,
    /// Fully allocated block.
    Dense {
        /// Axes subdivided at this level.
        axes: Axes,
        /// Declared extent per axis.
        extents: Extents,
    },
    /// Lazily allocated block per cell.
    Pointer {
        /// Axes subdivided at this level.
        axes: Axes,
        /// Declared extent per axis.
        extents: Extents,
    },
    /// Dense block with activation bits.
    Bitmasked {
        /// Axes subdivided at this level.
        axes: Axes,
        /// Declared extent per axis.
        extents: Extents,
    },
    /// Chunked variable-length list.
    Dynamic {
        /// The single axis of the list.
        axis: Axis,
        /// Maximum number of elements.
        dim: u32,
        /// Elements per chunk, as declared.
        chunk_size: u32,
    },
    /// Bit-packed record.
    BitStruct {
        /// Physical word width.
        num_bits: u32,
    },
    /// Bit-packed array of one member.
    BitArray {
        /// Axes subdivided at this level.
        axes: Axes,
        /// Declared extent per axis.
        extents: Extents,
        /// Physical word width.
        num_bits: u32,
    },
    /// Leaf bound to a field member.
    Place(PlaceInfo),
}

impl SNodeKind {
    /// The payload-free tag.
    pub fn ty(&self) -> SNodeType {
        match self {
            Self::Root => SNodeType::Root,
            Self::Dense { .. } => SNodeType::Dense,
            Self::Pointer { .. } => SNodeType::Pointer,
            Self::Bitmasked { .. } => SNodeType::Bitmasked,
            Self::Dynamic { .. } => SNodeType::Dynamic,
            Self::BitStruct { .. } => SNodeType::BitStruct,
            Self::BitArray { .. } => SNodeType::BitArray,
            Self::Place(_) => SNodeType::Place,
        }
    }

    /// Axes subdivided at this level, in declaration order.
    pub fn axes(&self) -> &[Axis] {
        match self {
            Self::Dense { axes, .. }
            | Self::Pointer { axes, .. }
            | Self::Bitmasked { axes, .. }
            | Self::BitArray { axes, .. } => axes,
            Self::Dynamic { axis, .. } => std::slice::from_ref(axis),
            Self::Root | Self::BitStruct { .. } | Self::Place(_) => &[],
        }
    }

    /// Declared extents, parallel to [`axes`](Self::axes).
    pub fn extents(&self) -> &[u32] {
        match self {
            Self::Dense { extents, .. }
            | Self::Pointer { extents, .. }
            | Self::Bitmasked { extents, .. }
            | Self::BitArray { extents, .. } => extents,
            Self::Dynamic { dim, .. } => std::slice::from_ref(dim),
            Self::Root | Self::BitStruct { .. } | Self::Place(_) => &[],
        }
    }

    /// Declared chunk size of a dynamic node.
    pub fn chunk_size(&self) -> Option<u32> {
        match self {
            Self::Dynamic { chunk_size, .. } => Some(*chunk_size),
            _ => None,
        }
    }

    /// Word width of a bit container.
    pub fn num_bits(&self) -> Option<u32> {
        match self {
            Self::BitStruct { num_bits } | Self::BitArray { num_bits, .. } => Some(*num_bits),
            _ => None,
        }
    }

    /// Place payload, if this is a place node.
    pub fn place(&self) -> Option<&PlaceInfo> {
        match self {
            Self::Place(info) => Some(info),
            _ => None,
        }
    }
}
