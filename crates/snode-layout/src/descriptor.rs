//! The compiled tree descriptor: per-node byte layout plus the member table.
//!
//! An [`SNodeTree`] is immutable once built. It records, for every node,
//! how large one of its cells is, where its slot sits inside the parent's
//! cell, and how many cells one container holds. The member table maps
//! each placed [`FieldMemberId`] to the place node that stores it.

use indexmap::IndexMap;
use snode_core::{FieldMemberId, LayoutConfig, NodeId, RootId, SNodeTreeId, SNodeType};
use snode_tree::{IndexLayout, SNodeKind};

/// Bytes of the header of a dynamic list: `u32` length, padding, `u64`
/// address of the first chunk.
pub const DYNAMIC_HEADER_BYTES: u64 = 16;

/// Bytes of the next-chunk link at the start of each dynamic chunk.
pub const CHUNK_LINK_BYTES: u64 = 8;

/// Bytes of one address slot.
pub const ADDRESS_BYTES: u64 = 8;

/// Container-specific layout of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerLayout {
    /// One cell.
    Root,
    /// `cells` cells inline.
    Dense,
    /// `cells` cells inline, then one mask bit per cell in `u64` words.
    Bitmasked {
        /// Offset of the first mask word from the container start.
        mask_offset: u64,
    },
    /// `cells` address slots, each pointing to a block of one cell.
    Pointer,
    /// A list header; elements live in a chain of chunks.
    Dynamic {
        /// Elements per chunk after padding.
        chunk_capacity: u32,
        /// Bytes of one chunk, link included.
        chunk_bytes: u64,
    },
    /// One packed word.
    BitStruct,
    /// One packed word of `cells` elements.
    BitArray,
    /// A scalar leaf.
    Place,
}

/// One node after layout compilation.
#[derive(Clone, Debug)]
pub struct CompiledNode {
    /// Node id (arena index).
    pub id: NodeId,
    /// Kind and declaration parameters.
    pub kind: SNodeKind,
    /// Node name.
    pub name: String,
    /// Parent, `None` for the root.
    pub parent: Option<NodeId>,
    /// Children in declaration order.
    pub children: Vec<NodeId>,
    /// Edges from the root.
    pub depth: u32,
    /// Index mapping.
    pub index: IndexLayout,
    /// Container-specific layout.
    pub container: ContainerLayout,
    /// Bytes of one cell (a scalar for place nodes, 0 for bit-packed leaves).
    pub cell_size_bytes: u64,
    /// Alignment of one cell.
    pub cell_align: u64,
    /// Memory cells per container.
    pub cells_per_container: u64,
    /// Bytes this node's container occupies in the parent's cell.
    pub container_bytes: u64,
    /// Alignment of the container slot.
    pub container_align: u64,
    /// Offset of the container slot inside the parent's cell.
    pub offset_bytes_in_parent_cell: u64,
}

impl CompiledNode {
    /// Kind tag.
    pub fn ty(&self) -> SNodeType {
        self.kind.ty()
    }
}

/// An immutable, compiled tree.
#[derive(Debug)]
pub struct SNodeTree {
    pub(crate) id: SNodeTreeId,
    pub(crate) root: RootId,
    pub(crate) config: LayoutConfig,
    pub(crate) nodes: Vec<CompiledNode>,
    pub(crate) members: IndexMap<FieldMemberId, NodeId>,
    pub(crate) compile_only: bool,
}

impl SNodeTree {
    /// Runtime-assigned tree id.
    pub fn id(&self) -> SNodeTreeId {
        self.id
    }

    /// Registry root handle the tree was built from.
    pub fn root_id(&self) -> RootId {
        self.root
    }

    /// Layout configuration the tree was compiled with.
    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Whether the tree was compiled without storage.
    pub fn is_compile_only(&self) -> bool {
        self.compile_only
    }

    /// Node by id.
    pub fn node(&self, id: NodeId) -> Option<&CompiledNode> {
        self.nodes.get(id.index())
    }

    /// The root node.
    pub fn root(&self) -> &CompiledNode {
        &self.nodes[0]
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> &[CompiledNode] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds nothing but its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Bytes of the root container.
    pub fn root_size_bytes(&self) -> u64 {
        self.root().cell_size_bytes
    }

    /// Place node storing `member`.
    pub fn place_of(&self, member: FieldMemberId) -> Option<NodeId> {
        self.members.get(&member).copied()
    }

    /// Placed members in placement order.
    pub fn members(&self) -> impl Iterator<Item = (&FieldMemberId, &NodeId)> {
        self.members.iter()
    }

    /// Ids from the root down to `id`, root first.
    pub fn path(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut cur = self.node(id).map(|n| n.id);
        while let Some(n) = cur {
            path.push(n);
            cur = self.nodes[n.index()].parent;
        }
        path.reverse();
        path
    }
}
