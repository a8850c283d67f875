//! Handles to nodes of finalized trees.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use snode_core::{Axis, DataType, FieldMember, Index, NodeId, SNodeTreeId, SNodeType};
use snode_tree::SNodeKind;

use crate::descriptor::{CompiledNode, SNodeTree};

/// A node of a finalized tree.
///
/// Cheap to clone. Two handles are equal iff they name the same tree and
/// node id.
#[derive(Clone)]
pub struct SNode {
    tree: Arc<SNodeTree>,
    id: NodeId,
}

impl SNode {
    /// Handle of `id` in `tree`, if the node exists.
    pub fn new(tree: Arc<SNodeTree>, id: NodeId) -> Option<Self> {
        tree.node(id)?;
        Some(Self { tree, id })
    }

    /// Handle of the root of `tree`.
    pub fn root(tree: Arc<SNodeTree>) -> Self {
        Self {
            tree,
            id: NodeId::ROOT,
        }
    }

    /// The tree this node belongs to.
    pub fn tree(&self) -> &Arc<SNodeTree> {
        &self.tree
    }

    /// Id of the tree.
    pub fn tree_id(&self) -> SNodeTreeId {
        self.tree.id()
    }

    /// Compiled data of this node.
    pub fn compiled(&self) -> &CompiledNode {
        &self.tree.nodes()[self.id.index()]
    }

    /// Node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.compiled().name
    }

    /// Kind tag.
    pub fn ty(&self) -> SNodeType {
        self.compiled().ty()
    }

    /// Whether this is a place node.
    pub fn is_place(&self) -> bool {
        self.ty() == SNodeType::Place
    }

    /// The member stored at a place node.
    pub fn member(&self) -> Option<&FieldMember> {
        self.compiled().kind.place().map(|p| &p.member)
    }

    /// Element type of a place node.
    pub fn dtype(&self) -> Option<DataType> {
        self.member().map(FieldMember::dtype)
    }

    /// Whether a place node stores a primal (non-gradient) member.
    pub fn is_primal(&self) -> bool {
        self.member().is_some_and(FieldMember::is_primal)
    }

    /// Whether a place node's member declares an adjoint.
    pub fn has_adjoint(&self) -> bool {
        self.member().is_some_and(|m| m.adjoint().is_some())
    }

    /// Entries an index expression for this node needs.
    pub fn num_active_indices(&self) -> usize {
        self.compiled().index.num_active_indices()
    }

    /// Axes in index-position order.
    pub fn physical_index_position(&self) -> &[Axis] {
        self.compiled().index.physical_index_position()
    }

    /// Declared shape, one entry per active index.
    pub fn shape(&self) -> SmallVec<[u64; 4]> {
        self.compiled().index.shape()
    }

    /// Product of declared extents of `axis` from the root.
    pub fn shape_along_axis(&self, axis: Axis) -> u64 {
        self.compiled().index.shape_along_axis(axis)
    }

    /// Extents declared at this level, parallel to its axes.
    pub fn dims(&self) -> &[u32] {
        self.compiled().kind.extents()
    }

    /// Declared chunk size of a dynamic node.
    pub fn chunk_size(&self) -> Option<u32> {
        self.compiled().kind.chunk_size()
    }

    /// Word width of a bit container.
    pub fn num_bits(&self) -> Option<u32> {
        self.compiled().kind.num_bits()
    }

    /// Offsets applied to index expressions of a place node.
    pub fn index_offsets(&self) -> &[i32] {
        match &self.compiled().kind {
            SNodeKind::Place(info) => &info.index_offsets,
            _ => &[],
        }
    }

    /// Bytes of one cell.
    pub fn cell_size_bytes(&self) -> u64 {
        self.compiled().cell_size_bytes
    }

    /// Offset of this node's slot inside its parent's cell.
    pub fn offset_bytes_in_parent_cell(&self) -> u64 {
        self.compiled().offset_bytes_in_parent_cell
    }

    /// The ancestor `n` edges up; `None` past the root.
    pub fn parent(&self, n: u32) -> Option<SNode> {
        let mut id = self.id;
        for _ in 0..n {
            id = self.tree.node(id)?.parent?;
        }
        Some(Self {
            tree: Arc::clone(&self.tree),
            id,
        })
    }

    /// Nodes from the root down to this one, root first.
    pub fn path_from_root(&self) -> Vec<SNode> {
        self.tree
            .path(self.id)
            .into_iter()
            .map(|id| Self {
                tree: Arc::clone(&self.tree),
                id,
            })
            .collect()
    }

    /// Children in declaration order.
    pub fn children(&self) -> Vec<SNode> {
        self.compiled()
            .children
            .iter()
            .map(|&id| Self {
                tree: Arc::clone(&self.tree),
                id,
            })
            .collect()
    }
}

impl PartialEq for SNode {
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.tree, &other.tree) || self.tree.root_id() == other.tree.root_id())
            && self.id == other.id
    }
}

impl Eq for SNode {}

impl fmt::Debug for SNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SNode")
            .field("tree", &self.tree.id())
            .field("id", &self.id)
            .field("ty", &self.ty())
            .finish()
    }
}

/// Renders the path from the root, e.g. `root => dense [8] => place [8]`.
impl fmt::Display for SNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, node) in self.path_from_root().iter().enumerate() {
            if k > 0 {
                f.write_str(" => ")?;
            }
            f.write_str(node.ty().name())?;
            let shape = node.shape();
            if !shape.is_empty() {
                f.write_str(" [")?;
                for (i, s) in shape.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{s}")?;
                }
                f.write_str("]")?;
            }
        }
        Ok(())
    }
}

/// Map an index of node `a` into the index space of node `b`.
///
/// Entries are matched by position: `indices[k]` is compared through
/// `a.shape()[k]` and `b.shape()[k]`. Where `a` is finer the entry is
/// floor-divided by the extent ratio; where it is coarser it is multiplied.
/// Positions past the shorter of the two shapes are returned unchanged.
pub fn rescale_index(a: &SNode, b: &SNode, indices: &[i32]) -> Index {
    let sa = a.shape();
    let sb = b.shape();
    let common = sa.len().min(sb.len());
    indices
        .iter()
        .enumerate()
        .map(|(k, &i)| {
            if k >= common {
                return i;
            }
            let (ea, eb) = (sa[k].max(1), sb[k].max(1));
            if ea > eb {
                i.div_euclid((ea / eb) as i32)
            } else if ea < eb {
                i * (eb / ea) as i32
            } else {
                i
            }
        })
        .collect()
}
