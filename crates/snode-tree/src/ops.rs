//! Structural calls and placement on draft nodes.
//!
//! Every call validates its arguments against the current tree before
//! touching it, so a failed call leaves the topology unchanged.

use indexmap::IndexSet;
use smallvec::{smallvec, SmallVec};
use snode_core::{
    Axes, Axis, DataType, Field, FieldMember, Index, NodeId, Place, Placement, SNodeError,
    SNodeType,
};

use crate::draft::{DraftNode, NodeRef, SNodeTreeDraft};
use crate::index::IndexLayout;
use crate::kind::{Extents, PlaceInfo, SNodeKind, SharedExponent};

/// Word widths accepted by bit containers.
pub const BIT_CONTAINER_WIDTHS: [u32; 4] = [8, 16, 32, 64];

/// Extents of a structural call: one value for every axis, or one per axis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dims {
    /// Broadcast to every axis.
    Uniform(u32),
    /// Must have one entry per axis.
    PerAxis(Extents),
}

impl Dims {
    fn broadcast(&self, n: usize) -> Result<Extents, SNodeError> {
        match self {
            Self::Uniform(v) => Ok(smallvec![*v; n]),
            Self::PerAxis(v) if v.len() == n => Ok(v.clone()),
            Self::PerAxis(v) => Err(SNodeError::invalid(format!(
                "{} extents given for {n} axes",
                v.len()
            ))),
        }
    }
}

impl From<u32> for Dims {
    fn from(v: u32) -> Self {
        Self::Uniform(v)
    }
}

impl<const N: usize> From<[u32; N]> for Dims {
    fn from(v: [u32; N]) -> Self {
        Self::PerAxis(v.iter().copied().collect())
    }
}

impl From<&[u32]> for Dims {
    fn from(v: &[u32]) -> Self {
        Self::PerAxis(v.iter().copied().collect())
    }
}

impl From<Vec<u32>> for Dims {
    fn from(v: Vec<u32>) -> Self {
        Self::PerAxis(v.into_iter().collect())
    }
}

/// Index offset of a placement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Offset {
    /// Same offset on every index.
    Uniform(i32),
    /// One offset per index of the placed node.
    PerIndex(Index),
}

impl From<i32> for Offset {
    fn from(v: i32) -> Self {
        Self::Uniform(v)
    }
}

impl<const N: usize> From<[i32; N]> for Offset {
    fn from(v: [i32; N]) -> Self {
        Self::PerIndex(v.iter().copied().collect())
    }
}

impl From<Vec<i32>> for Offset {
    fn from(v: Vec<i32>) -> Self {
        Self::PerIndex(v.into_iter().collect())
    }
}

/// Options of [`NodeMut::place_with`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaceOptions {
    /// Index offset of the placed members.
    pub offset: Option<Offset>,
    /// Group the call's quantized-float members under one exponent.
    pub shared_exponent: bool,
}

impl PlaceOptions {
    /// Options with the given offset.
    pub fn with_offset(offset: impl Into<Offset>) -> Self {
        Self {
            offset: Some(offset.into()),
            shared_exponent: false,
        }
    }

    /// Options for a shared-exponent placement.
    pub fn shared_exponent() -> Self {
        Self {
            offset: None,
            shared_exponent: true,
        }
    }
}

/// Editable handle of one draft node.
///
/// Structural calls consume the handle and return the handle of the new
/// child (or of this node for `place`), so calls chain:
///
/// ```
/// # use snode_core::{Axis, DataType, Field, LayoutConfig};
/// # use snode_tree::SNodeRegistry;
/// let registry = SNodeRegistry::new();
/// let mut draft = registry.create_root(LayoutConfig::default());
/// let x = Field::scalar("x", DataType::F32).unwrap();
/// draft.root_mut().dense(&[Axis::I], 8).unwrap().place(&[&x]).unwrap();
/// assert!(x.is_placed());
/// ```
#[derive(Debug)]
pub struct NodeMut<'a> {
    draft: &'a mut SNodeTreeDraft,
    id: NodeId,
}

impl<'a> NodeMut<'a> {
    pub(crate) fn new(draft: &'a mut SNodeTreeDraft, id: NodeId) -> Self {
        Self { draft, id }
    }

    /// Node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Kind tag.
    pub fn ty(&self) -> SNodeType {
        self.draft.get(self.id).kind.ty()
    }

    /// Borrow as a read-only view.
    pub fn as_ref(&self) -> NodeRef<'_> {
        NodeRef::new(self.draft, self.id)
    }

    /// Convert into a read-only view.
    pub fn into_ref(self) -> NodeRef<'a> {
        NodeRef::new(self.draft, self.id)
    }

    /// Append a dense child dividing `axes` by `dims`.
    pub fn dense(self, axes: &[Axis], dims: impl Into<Dims>) -> Result<NodeMut<'a>, SNodeError> {
        let (axes, extents) = self.check_structural("dense", axes, &dims.into())?;
        Ok(self.push(SNodeKind::Dense { axes, extents }))
    }

    /// Append a pointer child; each cell's block is allocated on activation.
    pub fn pointer(self, axes: &[Axis], dims: impl Into<Dims>) -> Result<NodeMut<'a>, SNodeError> {
        let (axes, extents) = self.check_structural("pointer", axes, &dims.into())?;
        Ok(self.push(SNodeKind::Pointer { axes, extents }))
    }

    /// Append a bitmasked child: dense storage plus one activation bit per cell.
    pub fn bitmasked(
        self,
        axes: &[Axis],
        dims: impl Into<Dims>,
    ) -> Result<NodeMut<'a>, SNodeError> {
        let (axes, extents) = self.check_structural("bitmasked", axes, &dims.into())?;
        Ok(self.push(SNodeKind::Bitmasked { axes, extents }))
    }

    /// Append a dynamic list of at most `dim` elements along one axis.
    ///
    /// `chunk_size` defaults to `dim`.
    pub fn dynamic(
        self,
        axes: &[Axis],
        dim: u32,
        chunk_size: Option<u32>,
    ) -> Result<NodeMut<'a>, SNodeError> {
        if axes.len() != 1 {
            return Err(SNodeError::invalid(format!(
                "dynamic nodes take exactly one axis, got {}",
                axes.len()
            )));
        }
        let (axes, extents) = self.check_structural("dynamic", axes, &Dims::Uniform(dim))?;
        let chunk_size = chunk_size.unwrap_or(extents[0]);
        if chunk_size == 0 {
            return Err(SNodeError::invalid("dynamic chunk size must be positive"));
        }
        Ok(self.push(SNodeKind::Dynamic {
            axis: axes[0],
            dim: extents[0],
            chunk_size,
        }))
    }

    /// Append a bit-packed record of `num_bits` bits.
    pub fn bit_struct(self, num_bits: u32) -> Result<NodeMut<'a>, SNodeError> {
        self.check_parent("bit_struct")?;
        check_width(num_bits)?;
        Ok(self.push(SNodeKind::BitStruct { num_bits }))
    }

    /// Append a bit-packed array stored in words of `num_bits` bits.
    pub fn bit_array(
        self,
        axes: &[Axis],
        dims: impl Into<Dims>,
        num_bits: u32,
    ) -> Result<NodeMut<'a>, SNodeError> {
        let (axes, extents) = self.check_structural("bit_array", axes, &dims.into())?;
        check_width(num_bits)?;
        Ok(self.push(SNodeKind::BitArray {
            axes,
            extents,
            num_bits,
        }))
    }

    /// Hashed containers are not supported; always fails.
    pub fn hash(self, _axes: &[Axis], _dims: impl Into<Dims>) -> Result<NodeMut<'a>, SNodeError> {
        Err(SNodeError::Unsupported {
            reason: "hash nodes are not supported".into(),
        })
    }

    /// Place every member of `fields` under this node.
    pub fn place(self, fields: &[&Field]) -> Result<NodeMut<'a>, SNodeError> {
        let args: Vec<Place<'_>> = fields.iter().map(|&f| Place::Field(f)).collect();
        self.place_with(&args, &PlaceOptions::default())
    }

    /// Place with offsets or a shared exponent.
    ///
    /// Placing on the root first inserts a zero-axis dense node and places
    /// under it; the returned handle is still the root.
    pub fn place_with(
        self,
        args: &[Place<'_>],
        options: &PlaceOptions,
    ) -> Result<NodeMut<'a>, SNodeError> {
        let members: Vec<FieldMember> = args.iter().flat_map(Place::members).collect();
        let plan = plan_place(self.draft, self.id, members, options)?;
        apply_place(self.draft, plan)?;
        Ok(self)
    }

    /// Place the unplaced adjoint of every placed primal member in this
    /// subtree next to its primal.
    pub fn lazy_grad(self) -> Result<NodeMut<'a>, SNodeError> {
        let mut containers = Vec::new();
        post_order(self.draft, self.id, &mut containers);

        let mut plans = Vec::new();
        for container in containers {
            for &child in &self.draft.get(container).children {
                let Some(info) = self.draft.get(child).kind.place() else {
                    continue;
                };
                let Some(adjoint) = info.member.adjoint() else {
                    continue;
                };
                if !info.member.is_primal() || adjoint.is_placed() {
                    continue;
                }
                let options = PlaceOptions {
                    offset: (!info.index_offsets.is_empty())
                        .then(|| Offset::PerIndex(info.index_offsets.clone())),
                    shared_exponent: false,
                };
                plans.push(plan_place(
                    self.draft,
                    container,
                    vec![adjoint.clone()],
                    &options,
                )?);
            }
        }
        for plan in plans {
            apply_place(self.draft, plan)?;
        }
        Ok(self)
    }

    fn check_parent(&self, op: &str) -> Result<(), SNodeError> {
        let ty = self.ty();
        if ty.accepts_structural_children() {
            Ok(())
        } else {
            Err(SNodeError::invalid(format!(
                "cannot add a {op} node under a {ty} node"
            )))
        }
    }

    fn check_structural(
        &self,
        op: &str,
        axes: &[Axis],
        dims: &Dims,
    ) -> Result<(Axes, Extents), SNodeError> {
        self.check_parent(op)?;
        let extents = dims.broadcast(axes.len())?;
        for (k, axis) in axes.iter().enumerate() {
            if !axis.is_valid() {
                return Err(SNodeError::invalid(format!(
                    "axis {} exceeds the maximum number of indices",
                    axis.0
                )));
            }
            if axes[..k].contains(axis) {
                return Err(SNodeError::invalid(format!(
                    "axis {axis} appears more than once"
                )));
            }
        }
        if let Some(pos) = extents.iter().position(|&e| e == 0) {
            return Err(SNodeError::invalid(format!(
                "extent of axis {} must be positive",
                axes[pos]
            )));
        }
        Ok((axes.iter().copied().collect(), extents))
    }

    fn push(self, kind: SNodeKind) -> NodeMut<'a> {
        let id = push_child(self.draft, self.id, kind);
        NodeMut {
            draft: self.draft,
            id,
        }
    }
}

fn check_width(num_bits: u32) -> Result<(), SNodeError> {
    if BIT_CONTAINER_WIDTHS.contains(&num_bits) {
        Ok(())
    } else {
        Err(SNodeError::invalid(format!(
            "bit container width must be 8, 16, 32 or 64 bits, got {num_bits}"
        )))
    }
}

fn push_child(draft: &mut SNodeTreeDraft, parent: NodeId, kind: SNodeKind) -> NodeId {
    let config = *draft.config();
    let id = NodeId(draft.nodes.len() as u32);
    let parent_node = draft.get(parent);
    let depth = parent_node.depth + 1;
    let (index, slow) = parent_node.index.child(kind.axes(), kind.extents(), &config);
    for axis in slow {
        tracing::warn!(
            node = id.0,
            %axis,
            extent = index.extractor(axis).declared,
            "non-first division of an axis uses a non-power-of-two extent; indexing will be slower"
        );
    }
    tracing::trace!(node = id.0, parent = parent.0, ty = %kind.ty(), "snode created");
    draft
        .nodes
        .push(DraftNode::new(id, kind, Some(parent), depth, index));
    draft.nodes[parent.index()].children.push(id);
    id
}

fn post_order(draft: &SNodeTreeDraft, id: NodeId, out: &mut Vec<NodeId>) {
    let node = draft.get(id);
    if node.kind.ty() == SNodeType::Place {
        return;
    }
    for &child in &node.children {
        post_order(draft, child, out);
    }
    out.push(id);
}

/// A validated placement, ready to apply.
struct PlacePlan {
    target: NodeId,
    implicit_dense: bool,
    infos: Vec<PlaceInfo>,
    bits_used: u32,
    exponent_groups: u32,
}

fn plan_place(
    draft: &SNodeTreeDraft,
    target: NodeId,
    members: Vec<FieldMember>,
    options: &PlaceOptions,
) -> Result<PlacePlan, SNodeError> {
    let node = draft.get(target);
    let implicit_dense = target.is_root();
    let target_ty = if implicit_dense {
        SNodeType::Dense
    } else {
        node.kind.ty()
    };
    let mut plan = PlacePlan {
        target,
        implicit_dense,
        infos: Vec::with_capacity(members.len()),
        bits_used: node.bits_used,
        exponent_groups: node.exponent_groups,
    };

    if members.is_empty() {
        if options.shared_exponent {
            return Err(SNodeError::invalid("shared exponent placement needs members"));
        }
        plan.implicit_dense = false;
        return Ok(plan);
    }

    let mut seen = IndexSet::with_capacity(members.len());
    for m in &members {
        if !seen.insert(m.id()) {
            return Err(SNodeError::invalid(format!(
                "member '{}' appears twice in one placement",
                m.name()
            )));
        }
        if m.is_placed() {
            return Err(SNodeError::invalid(format!(
                "member '{}' has already been placed",
                m.name()
            )));
        }
    }

    // Place nodes share the index space of their parent.
    let index: &IndexLayout = &node.index;
    let offsets = resolve_offsets(options, index.num_active_indices())?;

    let mut bit_offsets: Vec<(Option<u32>, Option<SharedExponent>)> = Vec::new();
    match (target_ty, node.kind.num_bits()) {
        (SNodeType::Place, _) => {
            return Err(SNodeError::invalid("cannot place under a place node"));
        }
        (SNodeType::BitStruct, Some(num_bits)) => {
            require_quant(&members, "bit_struct")?;
            let needed = if options.shared_exponent {
                shared_exponent_bits(&members)?
            } else {
                members.iter().map(|m| m.dtype().bits()).sum()
            };
            if plan.bits_used + needed > num_bits {
                return Err(SNodeError::invalid(format!(
                    "bit_struct of {num_bits} bits cannot hold {needed} more bits ({} in use)",
                    plan.bits_used
                )));
            }
            let mut cursor = plan.bits_used;
            if options.shared_exponent {
                let exponent_bits = needed - members.iter().map(digit_bits).sum::<u32>();
                let group = plan.exponent_groups;
                let exponent_bit_offset = cursor;
                cursor += exponent_bits;
                for (k, m) in members.iter().enumerate() {
                    bit_offsets.push((
                        Some(cursor),
                        Some(SharedExponent {
                            group,
                            exponent_bit_offset,
                            exponent_bits,
                            owner: k == 0,
                        }),
                    ));
                    cursor += digit_bits(m);
                }
                plan.exponent_groups += 1;
            } else {
                for m in &members {
                    bit_offsets.push((Some(cursor), None));
                    cursor += m.dtype().bits();
                }
            }
            plan.bits_used = cursor;
        }
        (SNodeType::BitArray, Some(num_bits)) => {
            if options.shared_exponent {
                return Err(SNodeError::invalid(
                    "shared exponent placement requires a bit_struct parent",
                ));
            }
            if members.len() != 1 || !node.children.is_empty() {
                return Err(SNodeError::invalid("a bit_array holds exactly one member"));
            }
            require_quant(&members, "bit_array")?;
            let bits = u64::from(members[0].dtype().bits());
            let cells = index.padded_cells();
            if cells * bits > u64::from(num_bits) {
                return Err(SNodeError::invalid(format!(
                    "bit_array of {num_bits} bits cannot hold {cells} elements of {bits} bits"
                )));
            }
            bit_offsets.push((Some(0), None));
            plan.bits_used = (cells * bits) as u32;
        }
        _ => {
            if options.shared_exponent {
                return Err(SNodeError::invalid(
                    "shared exponent placement requires a bit_struct parent",
                ));
            }
            if let Some(m) = members.iter().find(|m| m.dtype().is_quant()) {
                return Err(SNodeError::invalid(format!(
                    "quantized member '{}' ({}) must be placed under a bit_struct or bit_array",
                    m.name(),
                    m.dtype()
                )));
            }
            bit_offsets.resize(members.len(), (None, None));
        }
    }

    plan.infos = members
        .into_iter()
        .zip(bit_offsets)
        .map(|(member, (bit_offset, shared_exponent))| PlaceInfo {
            member,
            index_offsets: offsets.clone(),
            bit_offset,
            shared_exponent,
        })
        .collect();
    Ok(plan)
}

fn resolve_offsets(
    options: &PlaceOptions,
    num_indices: usize,
) -> Result<Index, SNodeError> {
    match &options.offset {
        None => Ok(SmallVec::new()),
        Some(Offset::Uniform(v)) => Ok(smallvec![*v; num_indices]),
        Some(Offset::PerIndex(v)) if v.len() == num_indices => Ok(v.clone()),
        Some(Offset::PerIndex(v)) => Err(SNodeError::invalid(format!(
            "offset has {} entries but the placed node has {num_indices} indices",
            v.len()
        ))),
    }
}

fn require_quant(members: &[FieldMember], container: &str) -> Result<(), SNodeError> {
    match members.iter().find(|m| !m.dtype().is_quant()) {
        Some(m) => Err(SNodeError::invalid(format!(
            "only quantized types can be placed under a {container}, '{}' is {}",
            m.name(),
            m.dtype()
        ))),
        None => Ok(()),
    }
}

fn digit_bits(m: &FieldMember) -> u32 {
    match m.dtype() {
        DataType::QuantFloat { digit_bits, .. } => u32::from(digit_bits),
        other => other.bits(),
    }
}

/// Bits taken by a shared-exponent group: every member's digits plus one
/// exponent.
fn shared_exponent_bits(members: &[FieldMember]) -> Result<u32, SNodeError> {
    let mut exponent = None;
    let mut total = 0;
    for m in members {
        let DataType::QuantFloat {
            digit_bits,
            exponent_bits,
        } = m.dtype()
        else {
            return Err(SNodeError::invalid(format!(
                "shared exponent members must be quantized floats, '{}' is {}",
                m.name(),
                m.dtype()
            )));
        };
        match exponent {
            None => exponent = Some(exponent_bits),
            Some(e) if e != exponent_bits => {
                return Err(SNodeError::invalid(
                    "shared exponent members must have the same exponent width",
                ));
            }
            Some(_) => {}
        }
        total += u32::from(digit_bits);
    }
    Ok(total + exponent.map_or(0, u32::from))
}

fn apply_place(draft: &mut SNodeTreeDraft, plan: PlacePlan) -> Result<(), SNodeError> {
    if plan.infos.is_empty() {
        return Ok(());
    }
    let target = if plan.implicit_dense {
        push_child(
            draft,
            plan.target,
            SNodeKind::Dense {
                axes: SmallVec::new(),
                extents: SmallVec::new(),
            },
        )
    } else {
        plan.target
    };
    let root = draft.root_id();
    for info in plan.infos {
        let member = info.member.clone();
        let node = push_child(draft, target, SNodeKind::Place(info));
        if member.bind(Placement { root, node }).is_err() {
            return Err(SNodeError::invalid(format!(
                "member '{}' has already been placed",
                member.name()
            )));
        }
        tracing::debug!(member = member.name(), node = node.0, %root, "member placed");
    }
    let target = &mut draft.nodes[target.index()];
    target.bits_used = plan.bits_used;
    target.exponent_groups = plan.exponent_groups;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SNodeRegistry;
    use snode_core::{FieldDecl, LayoutConfig, MemberLayout};

    fn draft() -> SNodeTreeDraft {
        SNodeRegistry::new().create_root(LayoutConfig::default())
    }

    fn qi(bits: u8) -> DataType {
        DataType::QuantInt { bits, signed: true }
    }

    fn qf(digit_bits: u8, exponent_bits: u8) -> DataType {
        DataType::QuantFloat {
            digit_bits,
            exponent_bits,
        }
    }

    #[test]
    fn scalar_dims_broadcast() {
        let mut d = draft();
        let n = d.root_mut().dense(&Axis::IJ, 4).unwrap().id();
        assert_eq!(d.node(n).unwrap().kind().extents(), &[4, 4]);
    }

    #[test]
    fn dims_axes_mismatch_rejected() {
        let mut d = draft();
        let err = d.root_mut().dense(&Axis::IJ, [4, 4, 4]).unwrap_err();
        assert!(matches!(err, SNodeError::InvalidArgument { .. }));
        assert_eq!(d.node_count(), 1);
    }

    #[test]
    fn repeated_or_invalid_axes_rejected() {
        let mut d = draft();
        assert!(d.root_mut().dense(&[Axis::I, Axis::I], 4).is_err());
        assert!(d.root_mut().pointer(&[Axis(12)], 4).is_err());
        assert!(d.root_mut().bitmasked(&[Axis::I], 0).is_err());
        assert_eq!(d.node_count(), 1);
    }

    #[test]
    fn dynamic_chunk_defaults_to_dim() {
        let mut d = draft();
        let n = d.root_mut().dynamic(&[Axis::I], 100, None).unwrap().id();
        assert_eq!(d.node(n).unwrap().kind().chunk_size(), Some(100));
    }

    #[test]
    fn dynamic_needs_one_axis() {
        let mut d = draft();
        assert!(d.root_mut().dynamic(&Axis::IJ, 8, None).is_err());
        assert!(d.root_mut().dynamic(&[], 8, None).is_err());
        assert!(d.root_mut().dynamic(&[Axis::I], 8, Some(0)).is_err());
    }

    #[test]
    fn hash_is_unsupported() {
        let mut d = draft();
        let err = d.root_mut().hash(&[Axis::I], 8).unwrap_err();
        assert!(matches!(err, SNodeError::Unsupported { .. }));
        assert_eq!(d.node_count(), 1);
    }

    #[test]
    fn place_on_root_inserts_implicit_dense() {
        let mut d = draft();
        let x = Field::scalar("x", DataType::F32).unwrap();
        d.root_mut().place(&[&x]).unwrap();
        let root = d.root();
        let children = root.children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].ty(), SNodeType::Dense);
        assert!(children[0].kind().axes().is_empty());
        let leaf = children[0].children()[0];
        assert_eq!(leaf.ty(), SNodeType::Place);
        assert_eq!(x.members()[0].placement().unwrap().node, leaf.id());
    }

    #[test]
    fn composite_field_gets_one_slot_per_member() {
        let mut d = draft();
        let v = Field::vector("v", DataType::F32, 3).unwrap();
        let n = d.root_mut().dense(&[Axis::I], 8).unwrap().place(&[&v]).unwrap().id();
        let names: Vec<_> = d.node(n).unwrap().children().iter().map(|c| c.name()).collect();
        assert_eq!(names, ["v[0]", "v[1]", "v[2]"]);
    }

    #[test]
    fn replacing_a_member_is_rejected() {
        let mut d = draft();
        let x = Field::scalar("x", DataType::F32).unwrap();
        let n = d.root_mut().dense(&[Axis::I], 8).unwrap().place(&[&x]).unwrap().id();
        let before = d.node_count();
        let err = d.node_mut(n).unwrap().place(&[&x]).unwrap_err();
        assert!(matches!(err, SNodeError::InvalidArgument { .. }));
        assert_eq!(d.node_count(), before);
    }

    #[test]
    fn no_structural_children_under_leaves() {
        let mut d = draft();
        let x = Field::scalar("x", DataType::F32).unwrap();
        let n = d.root_mut().dense(&[Axis::I], 8).unwrap().place(&[&x]).unwrap().id();
        let leaf = d.node(n).unwrap().child_ids()[0];
        assert!(d.node_mut(leaf).unwrap().dense(&[Axis::J], 2).is_err());
        let bs = d.root_mut().bit_struct(32).unwrap().id();
        assert!(d.node_mut(bs).unwrap().dense(&[Axis::J], 2).is_err());
    }

    #[test]
    fn offsets_broadcast_or_match() {
        let mut d = draft();
        let x = Field::scalar("x", DataType::F32).unwrap();
        let y = Field::scalar("y", DataType::F32).unwrap();
        let n = d.root_mut().dense(&Axis::IJ, 4).unwrap().id();
        d.node_mut(n)
            .unwrap()
            .place_with(&[Place::from(&x)], &PlaceOptions::with_offset(-2))
            .unwrap();
        let leaf = d.node(n).unwrap().children()[0];
        assert_eq!(leaf.kind().place().unwrap().index_offsets.as_slice(), &[-2, -2]);

        let err = d
            .node_mut(n)
            .unwrap()
            .place_with(&[Place::from(&y)], &PlaceOptions::with_offset([1, 2, 3]))
            .unwrap_err();
        assert!(matches!(err, SNodeError::InvalidArgument { .. }));
        assert!(!y.is_placed());
    }

    #[test]
    fn quant_types_only_in_bit_containers() {
        let mut d = draft();
        let q = Field::scalar("q", qi(5)).unwrap();
        let f = Field::scalar("f", DataType::F32).unwrap();
        let n = d.root_mut().dense(&[Axis::I], 8).unwrap().id();
        assert!(d.node_mut(n).unwrap().place(&[&q]).is_err());
        let bs = d.node_mut(n).unwrap().bit_struct(32).unwrap().id();
        assert!(d.node_mut(bs).unwrap().place(&[&f]).is_err());
        d.node_mut(bs).unwrap().place(&[&q]).unwrap();
        assert!(q.is_placed());
    }

    #[test]
    fn bit_struct_capacity_is_enforced() {
        let mut d = draft();
        let a = Field::scalar("a", qi(20)).unwrap();
        let b = Field::scalar("b", qi(12)).unwrap();
        let c = Field::scalar("c", qi(1)).unwrap();
        let bs = d.root_mut().bit_struct(32).unwrap().id();
        d.node_mut(bs).unwrap().place(&[&a, &b]).unwrap();
        assert_eq!(d.node(bs).unwrap().bits_used(), 32);
        let offsets: Vec<_> = d
            .node(bs)
            .unwrap()
            .children()
            .iter()
            .map(|c| c.kind().place().unwrap().bit_offset)
            .collect();
        assert_eq!(offsets, [Some(0), Some(20)]);
        assert!(d.node_mut(bs).unwrap().place(&[&c]).is_err());
        assert!(!c.is_placed());
    }

    #[test]
    fn shared_exponent_counts_one_exponent() {
        let mut d = draft();
        let v = Field::vector("v", qf(10, 6), 2).unwrap();
        let bs = d.root_mut().bit_struct(32).unwrap().id();
        d.node_mut(bs)
            .unwrap()
            .place_with(&[Place::from(&v)], &PlaceOptions::shared_exponent())
            .unwrap();
        // 6 exponent bits + 2 * 10 digit bits
        assert_eq!(d.node(bs).unwrap().bits_used(), 26);
        let kids = d.node(bs).unwrap().children();
        let first = kids[0].kind().place().unwrap();
        let second = kids[1].kind().place().unwrap();
        assert_eq!(first.bit_offset, Some(6));
        assert_eq!(second.bit_offset, Some(16));
        let shared = first.shared_exponent.unwrap();
        assert!(shared.owner);
        assert_eq!(shared.exponent_bit_offset, 0);
        assert!(!second.shared_exponent.unwrap().owner);
    }

    #[test]
    fn shared_exponent_needs_matching_quant_floats() {
        let mut d = draft();
        let a = Field::scalar("a", qf(8, 5)).unwrap();
        let b = Field::scalar("b", qf(8, 4)).unwrap();
        let bs = d.root_mut().bit_struct(32).unwrap().id();
        let err = d
            .node_mut(bs)
            .unwrap()
            .place_with(
                &[Place::from(&a), Place::from(&b)],
                &PlaceOptions::shared_exponent(),
            )
            .unwrap_err();
        assert!(matches!(err, SNodeError::InvalidArgument { .. }));

        let n = d.root_mut().dense(&[Axis::I], 4).unwrap().id();
        assert!(d
            .node_mut(n)
            .unwrap()
            .place_with(&[Place::from(&a)], &PlaceOptions::shared_exponent())
            .is_err());
    }

    #[test]
    fn bit_array_fits_cells_in_word() {
        let mut d = draft();
        let q = Field::scalar("q", qi(4)).unwrap();
        let r = Field::scalar("r", qi(4)).unwrap();
        let ba = d.root_mut().bit_array(&[Axis::I], 8, 32).unwrap().id();
        d.node_mut(ba).unwrap().place(&[&q]).unwrap();
        assert!(d.node_mut(ba).unwrap().place(&[&r]).is_err());

        let wide = Field::scalar("w", qi(8)).unwrap();
        let ba = d.root_mut().bit_array(&[Axis::J], 8, 32).unwrap().id();
        assert!(d.node_mut(ba).unwrap().place(&[&wide]).is_err());
        assert!(d.root_mut().bit_struct(12).is_err());
    }

    #[test]
    fn lazy_grad_places_adjoints_next_to_primals() {
        let mut d = draft();
        let x = Field::declare(FieldDecl {
            name: "x".into(),
            dtype: DataType::F32,
            layout: MemberLayout::Vector { n: 2 },
            needs_grad: true,
        })
        .unwrap();
        let n = d.root_mut().dense(&[Axis::I], 8).unwrap().place(&[&x]).unwrap().id();
        d.root_mut().lazy_grad().unwrap();
        let grad = x.adjoint().unwrap();
        assert!(grad.is_placed());
        let names: Vec<_> = d.node(n).unwrap().children().iter().map(|c| c.name()).collect();
        assert_eq!(names, ["x[0]", "x[1]", "x.grad[0]", "x.grad[1]"]);

        // A second pass finds nothing left to place.
        let count = d.node_count();
        d.root_mut().lazy_grad().unwrap();
        assert_eq!(d.node_count(), count);
    }

    #[test]
    fn lazy_grad_keeps_primal_offsets() {
        let mut d = draft();
        let x = Field::declare(FieldDecl {
            name: "x".into(),
            dtype: DataType::F64,
            layout: MemberLayout::Scalar,
            needs_grad: true,
        })
        .unwrap();
        let n = d.root_mut().dense(&[Axis::I], 8).unwrap().id();
        d.node_mut(n)
            .unwrap()
            .place_with(&[Place::from(&x)], &PlaceOptions::with_offset(-4))
            .unwrap();
        d.root_mut().lazy_grad().unwrap();
        let adj = d.node(n).unwrap().children()[1];
        assert_eq!(adj.kind().place().unwrap().index_offsets.as_slice(), &[-4]);
    }

    #[test]
    fn parent_and_path() {
        let mut d = draft();
        let x = Field::scalar("x", DataType::I32).unwrap();
        let leaf_parent = d
            .root_mut()
            .pointer(&[Axis::I], 4)
            .unwrap()
            .dense(&[Axis::I], 4)
            .unwrap()
            .place(&[&x])
            .unwrap()
            .id();
        let leaf = d.node(leaf_parent).unwrap().children()[0];
        assert_eq!(leaf.depth(), 3);
        let path = leaf.path_from_root();
        assert_eq!(path.len(), 4);
        assert_eq!(path[0], d.root());
        assert_eq!(leaf.parent(3), Some(d.root()));
        assert_eq!(leaf.parent(4), None);
        assert_eq!(leaf.parent(0), Some(leaf));
    }

    #[test]
    fn non_pot_redivision_still_builds() {
        let mut d = draft();
        let n = d
            .root_mut()
            .dense(&[Axis::I], 4)
            .unwrap()
            .dense(&[Axis::I], 3)
            .unwrap()
            .id();
        assert_eq!(d.node(n).unwrap().index_layout().shape().as_slice(), &[12]);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn nested_divisions_multiply_shape(outer in 1u32..64, inner in 1u32..64) {
                let mut d = draft();
                let n = d
                    .root_mut()
                    .pointer(&[Axis::I], outer)
                    .unwrap()
                    .dense(&[Axis::I], inner)
                    .unwrap()
                    .id();
                let shape = d.node(n).unwrap().index_layout().shape();
                prop_assert_eq!(shape.as_slice(), &[u64::from(outer) * u64::from(inner)]);
            }

            #[test]
            fn rejected_dims_leave_tree_unchanged(
                extents in prop::collection::vec(0u32..4, 1..4),
            ) {
                let mut d = draft();
                let before = d.node_count();
                let axes = &Axis::IJKL[..extents.len()];
                let result = d.root_mut().dense(axes, extents.clone());
                if extents.contains(&0) {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(d.node_count(), before);
                } else {
                    prop_assert!(result.is_ok());
                    prop_assert_eq!(d.node_count(), before + 1);
                }
            }
        }
    }
}
