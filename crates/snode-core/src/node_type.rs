//! The [`SNodeType`] tag.

use std::fmt;

/// Container kind of a node, without payload.
///
/// Hashed containers are not representable: the `hash` structural call
/// always fails, so no node can carry that kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SNodeType {
    /// The implicit root of a tree.
    Root,
    /// Fully allocated contiguous block.
    Dense,
    /// Lazily allocated block per cell.
    Pointer,
    /// Variable-length list grown in chunks.
    Dynamic,
    /// Dense block with one activation bit per cell.
    Bitmasked,
    /// Bit-packed record of quantized members.
    BitStruct,
    /// Bit-packed array of one quantized member.
    BitArray,
    /// Leaf binding one field member.
    Place,
}

impl SNodeType {
    /// Whether cells of this kind can be individually activated.
    pub fn is_sparse(self) -> bool {
        matches!(self, Self::Pointer | Self::Dynamic | Self::Bitmasked)
    }

    /// Whether this kind may receive structural children.
    pub fn accepts_structural_children(self) -> bool {
        !matches!(self, Self::Place | Self::BitStruct | Self::BitArray)
    }

    /// Whether this kind packs its members at bit granularity.
    pub fn is_bit_level(self) -> bool {
        matches!(self, Self::BitStruct | Self::BitArray)
    }

    /// Lowercase name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Dense => "dense",
            Self::Pointer => "pointer",
            Self::Dynamic => "dynamic",
            Self::Bitmasked => "bitmasked",
            Self::BitStruct => "bit_struct",
            Self::BitArray => "bit_array",
            Self::Place => "place",
        }
    }
}

impl fmt::Display for SNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
