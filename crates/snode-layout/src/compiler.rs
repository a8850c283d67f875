//! The [`LayoutCompiler`] seam and the in-repo [`StructCompiler`].

use indexmap::IndexMap;
use snode_core::{SNodeError, SNodeTreeId};
use snode_tree::{SNodeKind, SealedTree};

use crate::descriptor::{
    CompiledNode, ContainerLayout, SNodeTree, ADDRESS_BYTES, CHUNK_LINK_BYTES,
    DYNAMIC_HEADER_BYTES,
};

/// Input of one compilation.
#[derive(Clone, Copy, Debug)]
pub struct CompileRequest<'a> {
    /// Id the runtime assigns to the tree.
    pub tree: SNodeTreeId,
    /// The registry-finalized tree.
    pub sealed: &'a SealedTree,
    /// Resolve layout only; no storage will be materialized.
    pub compile_only: bool,
}

/// Turns a sealed tree into an executable layout.
pub trait LayoutCompiler: Send + Sync {
    /// Compile one tree.
    fn compile(&self, request: CompileRequest<'_>) -> Result<SNodeTree, SNodeError>;
}

/// Lays nodes out as nested structs.
///
/// Each cell holds its children's container slots in declaration order,
/// aligned to their natural alignment, and is padded to the largest
/// alignment among them.
#[derive(Clone, Copy, Debug, Default)]
pub struct StructCompiler;

impl LayoutCompiler for StructCompiler {
    fn compile(&self, request: CompileRequest<'_>) -> Result<SNodeTree, SNodeError> {
        let draft = request.sealed.draft();
        let config = *draft.config();

        let mut nodes: Vec<CompiledNode> = draft
            .iter()
            .map(|n| CompiledNode {
                id: n.id(),
                kind: n.kind().clone(),
                name: n.name().to_string(),
                parent: n.parent(1).map(|p| p.id()),
                children: n.child_ids().to_vec(),
                depth: n.depth(),
                index: n.index_layout().clone(),
                container: ContainerLayout::Root,
                cell_size_bytes: 0,
                cell_align: 1,
                cells_per_container: n.index_layout().padded_cells(),
                container_bytes: 0,
                container_align: 1,
                offset_bytes_in_parent_cell: 0,
            })
            .collect();

        // Children always have larger ids than their parents, so walking ids
        // backwards visits every child before its parent.
        for i in (0..nodes.len()).rev() {
            let (cell_size, cell_align) = cell_layout(&mut nodes, i)?;
            let node = &mut nodes[i];
            node.cell_size_bytes = cell_size;
            node.cell_align = cell_align;
            let n = node.cells_per_container;

            let (container, bytes, align) = match &node.kind {
                SNodeKind::Root => (ContainerLayout::Root, cell_size, cell_align),
                SNodeKind::Dense { .. } => {
                    (ContainerLayout::Dense, mul(n, cell_size)?, cell_align)
                }
                SNodeKind::Bitmasked { .. } => {
                    let mask_offset = align_up(mul(n, cell_size)?, 8);
                    let mask_bytes = n.div_ceil(64) * 8;
                    (
                        ContainerLayout::Bitmasked { mask_offset },
                        add(mask_offset, mask_bytes)?,
                        cell_align.max(8),
                    )
                }
                SNodeKind::Pointer { .. } => {
                    (ContainerLayout::Pointer, mul(n, ADDRESS_BYTES)?, ADDRESS_BYTES)
                }
                SNodeKind::Dynamic { chunk_size, .. } => {
                    let chunk_capacity = config.padded_extent(*chunk_size);
                    let chunk_bytes =
                        add(CHUNK_LINK_BYTES, mul(u64::from(chunk_capacity), cell_size)?)?;
                    (
                        ContainerLayout::Dynamic {
                            chunk_capacity,
                            chunk_bytes,
                        },
                        DYNAMIC_HEADER_BYTES,
                        8,
                    )
                }
                SNodeKind::BitStruct { num_bits } => {
                    let b = u64::from(*num_bits / 8);
                    (ContainerLayout::BitStruct, b, b)
                }
                SNodeKind::BitArray { num_bits, .. } => {
                    let b = u64::from(*num_bits / 8);
                    (ContainerLayout::BitArray, b, b)
                }
                SNodeKind::Place(_) => (ContainerLayout::Place, cell_size, cell_align),
            };
            node.container = container;
            node.container_bytes = bytes;
            node.container_align = align;
        }

        let members: IndexMap<_, _> = nodes
            .iter()
            .filter_map(|n| n.kind.place().map(|p| (p.member.id(), n.id)))
            .collect();

        let tree = SNodeTree {
            id: request.tree,
            root: draft.root_id(),
            config,
            nodes,
            members,
            compile_only: request.compile_only,
        };
        tracing::debug!(
            tree = %tree.id,
            root = %tree.root,
            nodes = tree.len(),
            root_bytes = tree.root_size_bytes(),
            compile_only = tree.compile_only,
            "snode tree compiled"
        );
        Ok(tree)
    }
}

/// Size and alignment of one cell of node `i`; assigns the offsets of its
/// children's slots.
fn cell_layout(nodes: &mut [CompiledNode], i: usize) -> Result<(u64, u64), SNodeError> {
    match &nodes[i].kind {
        SNodeKind::Place(info) => {
            let under_bits = nodes[i]
                .parent
                .is_some_and(|p| nodes[p.index()].ty().is_bit_level());
            if under_bits {
                return Ok((0, 1));
            }
            let bytes = u64::from(info.member.dtype().byte_size().unwrap_or(0));
            return Ok((bytes, bytes.max(1)));
        }
        SNodeKind::BitStruct { num_bits } | SNodeKind::BitArray { num_bits, .. } => {
            let b = u64::from(*num_bits / 8);
            return Ok((b, b));
        }
        _ => {}
    }

    let children = nodes[i].children.clone();
    let mut cursor = 0u64;
    let mut max_align = 1u64;
    for c in children {
        let child = &mut nodes[c.index()];
        let offset = align_up(cursor, child.container_align);
        child.offset_bytes_in_parent_cell = offset;
        cursor = add(offset, child.container_bytes)?;
        max_align = max_align.max(child.container_align);
    }
    Ok((align_up(cursor, max_align), max_align))
}

fn align_up(v: u64, align: u64) -> u64 {
    v.div_ceil(align) * align
}

fn mul(a: u64, b: u64) -> Result<u64, SNodeError> {
    a.checked_mul(b)
        .ok_or_else(|| SNodeError::invalid(format!("layout size {a} * {b} overflows")))
}

fn add(a: u64, b: u64) -> Result<u64, SNodeError> {
    a.checked_add(b)
        .ok_or_else(|| SNodeError::invalid(format!("layout size {a} + {b} overflows")))
}
