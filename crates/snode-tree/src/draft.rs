//! The editable tree arena and read-only node views.

use std::fmt;

use snode_core::{FieldMember, LayoutConfig, NodeId, RootId, SNodeType};

use crate::index::IndexLayout;
use crate::kind::SNodeKind;
use crate::ops::NodeMut;

/// One node of a draft tree.
#[derive(Clone, Debug)]
pub(crate) struct DraftNode {
    pub(crate) kind: SNodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) depth: u32,
    pub(crate) name: String,
    pub(crate) index: IndexLayout,
    /// Bits claimed inside a bit container.
    pub(crate) bits_used: u32,
    /// Shared-exponent groups opened inside a `bit_struct`.
    pub(crate) exponent_groups: u32,
}

impl DraftNode {
    pub(crate) fn new(
        id: NodeId,
        kind: SNodeKind,
        parent: Option<NodeId>,
        depth: u32,
        index: IndexLayout,
    ) -> Self {
        let name = match &kind {
            SNodeKind::Place(info) => info.member.name().to_string(),
            other => format!("S{}{}", id.0, other.ty()),
        };
        Self {
            kind,
            parent,
            children: Vec::new(),
            depth,
            name,
            index,
            bits_used: 0,
            exponent_groups: 0,
        }
    }
}

/// A tree under construction.
///
/// Nodes live in an arena indexed by [`NodeId`]; the root occupies slot 0.
/// Structural calls go through [`NodeMut`]; queries through [`NodeRef`].
#[derive(Debug)]
pub struct SNodeTreeDraft {
    root: RootId,
    config: LayoutConfig,
    pub(crate) nodes: Vec<DraftNode>,
}

impl SNodeTreeDraft {
    pub(crate) fn new(root: RootId, config: LayoutConfig) -> Self {
        Self {
            root,
            config,
            nodes: vec![DraftNode::new(
                NodeId::ROOT,
                SNodeKind::Root,
                None,
                0,
                IndexLayout::root(),
            )],
        }
    }

    /// Registry handle of this tree's root.
    pub fn root_id(&self) -> RootId {
        self.root
    }

    /// Layout configuration captured at creation.
    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// View of the root.
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            draft: self,
            id: NodeId::ROOT,
        }
    }

    /// View of node `id`, if it exists.
    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id.index() < self.nodes.len()).then_some(NodeRef { draft: self, id })
    }

    /// Editable handle of the root.
    pub fn root_mut(&mut self) -> NodeMut<'_> {
        NodeMut::new(self, NodeId::ROOT)
    }

    /// Editable handle of node `id`, if it exists.
    pub fn node_mut(&mut self, id: NodeId) -> Option<NodeMut<'_>> {
        if id.index() < self.nodes.len() {
            Some(NodeMut::new(self, id))
        } else {
            None
        }
    }

    /// All nodes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = NodeRef<'_>> + '_ {
        (0..self.nodes.len()).map(move |i| NodeRef {
            draft: self,
            id: NodeId(i as u32),
        })
    }

    pub(crate) fn get(&self, id: NodeId) -> &DraftNode {
        &self.nodes[id.index()]
    }
}

/// Read-only view of one draft node.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    draft: &'a SNodeTreeDraft,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    pub(crate) fn new(draft: &'a SNodeTreeDraft, id: NodeId) -> Self {
        Self { draft, id }
    }

    fn data(&self) -> &'a DraftNode {
        self.draft.get(self.id)
    }

    /// Node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Kind and declaration parameters.
    pub fn kind(&self) -> &'a SNodeKind {
        &self.data().kind
    }

    /// Kind tag.
    pub fn ty(&self) -> SNodeType {
        self.data().kind.ty()
    }

    /// Node name: the member name for place nodes, `S<id><kind>` otherwise.
    pub fn name(&self) -> &'a str {
        &self.data().name
    }

    /// Number of edges from the root.
    pub fn depth(&self) -> u32 {
        self.data().depth
    }

    /// Index mapping.
    pub fn index_layout(&self) -> &'a IndexLayout {
        &self.data().index
    }

    /// The member bound to a place node.
    pub fn placed_member(&self) -> Option<&'a FieldMember> {
        self.data().kind.place().map(|p| &p.member)
    }

    /// Bits claimed so far inside a bit container.
    pub fn bits_used(&self) -> u32 {
        self.data().bits_used
    }

    /// The ancestor `n` edges up.
    ///
    /// `parent(0)` is the node itself; walking past the root yields `None`.
    pub fn parent(&self, n: u32) -> Option<NodeRef<'a>> {
        let mut id = self.id;
        for _ in 0..n {
            id = self.draft.get(id).parent?;
        }
        Some(NodeRef::new(self.draft, id))
    }

    /// Nodes from the root down to this one, root first.
    pub fn path_from_root(&self) -> Vec<NodeRef<'a>> {
        let mut path = Vec::with_capacity(self.depth() as usize + 1);
        let mut cur = Some(self.id);
        while let Some(id) = cur {
            path.push(NodeRef::new(self.draft, id));
            cur = self.draft.get(id).parent;
        }
        path.reverse();
        path
    }

    /// Children in declaration order.
    pub fn children(&self) -> Vec<NodeRef<'a>> {
        self.data()
            .children
            .iter()
            .map(|&c| NodeRef::new(self.draft, c))
            .collect()
    }

    /// Child ids in declaration order.
    pub fn child_ids(&self) -> &'a [NodeId] {
        &self.data().children
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.draft, other.draft) && self.id == other.id
    }
}

impl Eq for NodeRef<'_> {}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("ty", &self.ty())
            .field("name", &self.name())
            .finish()
    }
}
