//! Materialized storage of one tree and the sparse operations on it.
//!
//! ```text
//! TreeStorage
//! ├── SegmentList (bump-allocated byte pool)
//! ├── root container (one cell of the root)
//! └── BlockAllocator per pointer / dynamic node
//! ```
//!
//! Container encodings inside a parent cell:
//!
//! - dense: `cells * cell_size` bytes.
//! - bitmasked: the dense cells, then one mask bit per cell in `u64` words.
//! - pointer: one address per cell; a non-null address names a block of
//!   one cell owned by the node's allocator.
//! - dynamic: `{ u32 len, u32 pad, u64 head }`; `head` starts a chain of
//!   chunks, each `{ u64 next, cells[chunk_capacity] }`.
//! - bit_struct / bit_array: one little-endian word.

use indexmap::IndexMap;
use snode_core::{AccessError, DataType, NodeId, SNodeType, Scalar};
use snode_layout::{CompiledNode, ContainerLayout, SNodeTree};

use crate::access::{digit, linear, Coords};
use crate::address::Address;
use crate::allocator::BlockAllocator;
use crate::config::RuntimeConfig;
use crate::segment::SegmentList;
use crate::value;

/// Whether a walk may allocate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Activate,
    Lookup,
}

/// Storage of one materialized tree.
pub struct TreeStorage {
    segments: SegmentList,
    root: Address,
    allocators: IndexMap<NodeId, BlockAllocator>,
    /// Per node: whether its subtree (itself included) has a sparse node.
    sparse_below: Vec<bool>,
}

impl TreeStorage {
    /// Allocate the root container and per-node allocators of `tree`.
    pub fn new(tree: &SNodeTree, config: &RuntimeConfig) -> Result<Self, AccessError> {
        let mut segments = SegmentList::new(config.segment_bytes, config.max_segments);
        let root_bytes = usize::try_from(tree.root_size_bytes()).unwrap_or(usize::MAX);
        let root = segments.alloc(root_bytes.max(8))?;

        let mut allocators = IndexMap::new();
        for node in tree.nodes() {
            match node.container {
                ContainerLayout::Pointer => {
                    allocators.insert(node.id, BlockAllocator::new(node.cell_size_bytes as usize));
                }
                ContainerLayout::Dynamic { chunk_bytes, .. } => {
                    allocators.insert(node.id, BlockAllocator::new(chunk_bytes as usize));
                }
                _ => {}
            }
        }

        let nodes = tree.nodes();
        let mut sparse_below = vec![false; nodes.len()];
        for node in nodes.iter().rev() {
            let below = node.children.iter().any(|c| sparse_below[c.index()]);
            sparse_below[node.id.index()] = node.ty().is_sparse() || below;
        }

        Ok(Self {
            segments,
            root,
            allocators,
            sparse_below,
        })
    }

    /// Address of the root container.
    pub fn root_address(&self) -> Address {
        self.root
    }

    /// Bytes handed out by the pool.
    pub fn used_bytes(&self) -> usize {
        self.segments.total_used()
    }

    /// Live blocks (pointer) or chunks (dynamic) of `node`; 0 for other kinds.
    pub fn num_dynamically_allocated(&self, node: NodeId) -> usize {
        self.allocators.get(&node).map_or(0, BlockAllocator::live_count)
    }

    /// Activate every sparse level on the path to the addressed cell.
    pub fn activate(
        &mut self,
        tree: &SNodeTree,
        target: &CompiledNode,
        coords: &Coords,
    ) -> Result<(), AccessError> {
        let path = tree.path(target.id);
        self.walk(tree, &path, target, coords, Mode::Activate)?;
        Ok(())
    }

    /// Whether every sparse level on the path reports the cell active.
    pub fn is_active(
        &mut self,
        tree: &SNodeTree,
        target: &CompiledNode,
        coords: &Coords,
    ) -> Result<bool, AccessError> {
        let path = tree.path(target.id);
        Ok(self.walk(tree, &path, target, coords, Mode::Lookup)?.is_some())
    }

    /// Address of the addressed cell; fails if the path is inactive.
    pub fn cell_address(
        &mut self,
        tree: &SNodeTree,
        target: &CompiledNode,
        coords: &Coords,
    ) -> Result<Address, AccessError> {
        let path = tree.path(target.id);
        self.walk(tree, &path, target, coords, Mode::Lookup)?
            .ok_or(AccessError::Inactive)
    }

    /// Release the addressed cell of a sparse node and everything below it.
    ///
    /// For a dynamic node the whole list holding the element is cleared.
    pub fn deactivate(
        &mut self,
        tree: &SNodeTree,
        target: &CompiledNode,
        coords: &Coords,
    ) -> Result<(), AccessError> {
        let ty = target.ty();
        if !ty.is_sparse() {
            return Err(AccessError::WrongKind {
                op: "deactivate",
                ty,
            });
        }
        let path = tree.path(target.id);
        let parent_path = &path[..path.len() - 1];
        let Some(parent_cell) = self.walk(tree, parent_path, target, coords, Mode::Lookup)? else {
            return Ok(());
        };
        let slot = parent_cell.add(target.offset_bytes_in_parent_cell);
        let lin = linear(target, target, coords);
        let cs = target.cell_size_bytes;

        match target.container {
            ContainerLayout::Pointer => {
                let ptr_addr = slot.add(lin * 8);
                let block = Address::from_raw(self.segments.read_u64(ptr_addr));
                if !block.is_null() {
                    self.release_cell(tree, target, block);
                    self.free(target.id, block);
                    self.segments.write_u64(ptr_addr, 0);
                }
            }
            ContainerLayout::Bitmasked { mask_offset } => {
                let word_addr = slot.add(mask_offset + (lin / 64) * 8);
                let bit = 1u64 << (lin % 64);
                let word = self.segments.read_u64(word_addr);
                if word & bit != 0 {
                    let cell = slot.add(lin * cs);
                    self.release_cell(tree, target, cell);
                    self.segments.zero(cell, cs as usize);
                    self.segments.write_u64(word_addr, word & !bit);
                }
            }
            ContainerLayout::Dynamic { .. } => self.release_container(tree, target, slot),
            _ => {}
        }
        tracing::trace!(node = target.id.0, "deactivated");
        Ok(())
    }

    /// Append `value` to the dynamic list addressed by parent-cell `coords`.
    ///
    /// Returns the insertion position.
    pub fn append(
        &mut self,
        tree: &SNodeTree,
        dynamic: &CompiledNode,
        coords: &Coords,
        value: Scalar,
    ) -> Result<u32, AccessError> {
        let DynamicInfo { dim, place } = check_dynamic(tree, dynamic, "append")?;
        let Some(place) = place else {
            return Err(AccessError::WrongKind {
                op: "append",
                ty: dynamic.ty(),
            });
        };
        let dtype = place
            .kind
            .place()
            .map(|p| p.member.dtype())
            .ok_or(AccessError::WrongKind {
                op: "append",
                ty: place.ty(),
            })?;
        value::check_accessible(dtype)?;

        let parent = parent_of(tree, dynamic)?;
        let path = tree.path(parent.id);
        let parent_cell = self
            .walk(tree, &path, parent, coords, Mode::Activate)?
            .ok_or(AccessError::Inactive)?;
        let slot = parent_cell.add(dynamic.offset_bytes_in_parent_cell);
        let len = self.segments.read_u32(slot);
        if len >= dim {
            return Err(AccessError::DynamicFull { capacity: dim });
        }
        self.grow(dynamic, slot, len + 1)?;
        let cell = self.element(dynamic, slot, u64::from(len));
        let at = cell.add(place.offset_bytes_in_parent_cell);
        let bytes = place.cell_size_bytes as usize;
        value::encode(dtype, value, self.segments.bytes_mut(at, bytes));
        Ok(len)
    }

    /// Element count of the dynamic list addressed by parent-cell `coords`.
    pub fn length(
        &mut self,
        tree: &SNodeTree,
        dynamic: &CompiledNode,
        coords: &Coords,
    ) -> Result<u32, AccessError> {
        check_dynamic(tree, dynamic, "length")?;
        let parent = parent_of(tree, dynamic)?;
        let path = tree.path(parent.id);
        match self.walk(tree, &path, parent, coords, Mode::Lookup)? {
            Some(cell) => Ok(self
                .segments
                .read_u32(cell.add(dynamic.offset_bytes_in_parent_cell))),
            None => Ok(0),
        }
    }

    /// Read the member stored at a place node; inactive cells read as zero.
    pub fn read(
        &mut self,
        tree: &SNodeTree,
        place: &CompiledNode,
        coords: &Coords,
    ) -> Result<Scalar, AccessError> {
        let dtype = place_dtype(place, "read")?;
        let path = tree.path(place.id);
        let Some(cell) = self.walk(tree, &path, place, coords, Mode::Lookup)? else {
            return Ok(value::zero(dtype));
        };
        match bit_slot(tree, place, coords)? {
            Some(BitSlot { word_bytes, offset }) => {
                let word = value::load_word(self.segments.bytes(cell, word_bytes));
                Ok(value::extract_bits(word, offset, dtype.bits(), dtype.is_signed()))
            }
            None => Ok(value::decode(
                dtype,
                self.segments.bytes(cell, place.cell_size_bytes as usize),
            )),
        }
    }

    /// Write the member stored at a place node, activating its path.
    pub fn write(
        &mut self,
        tree: &SNodeTree,
        place: &CompiledNode,
        coords: &Coords,
        v: Scalar,
    ) -> Result<(), AccessError> {
        let dtype = place_dtype(place, "write")?;
        let path = tree.path(place.id);
        let cell = self
            .walk(tree, &path, place, coords, Mode::Activate)?
            .ok_or(AccessError::Inactive)?;
        match bit_slot(tree, place, coords)? {
            Some(BitSlot { word_bytes, offset }) => {
                let bytes = self.segments.bytes_mut(cell, word_bytes);
                let word = value::insert_bits(value::load_word(bytes), offset, dtype.bits(), v);
                value::store_word(word, bytes);
            }
            None => {
                let bytes = self.segments.bytes_mut(cell, place.cell_size_bytes as usize);
                value::encode(dtype, v, bytes);
            }
        }
        Ok(())
    }

    /// Release every instance of `node`'s container, children first.
    pub fn deactivate_all(&mut self, tree: &SNodeTree, node: &CompiledNode) {
        if node.id.is_root() {
            let root = tree.root();
            self.release_cell(tree, root, self.root);
            return;
        }
        let path = tree.path(node.id);
        let mut slots = Vec::new();
        self.collect_slots(tree, &path, 0, self.root, &mut slots);
        for slot in slots {
            self.release_container(tree, node, slot);
        }
        tracing::debug!(node = node.id.0, "deactivated all");
    }

    /// Walk `path` from the root, returning the cell of its last node.
    ///
    /// Digits are taken relative to `target`. `None` when a sparse level is
    /// inactive in [`Mode::Lookup`].
    fn walk(
        &mut self,
        tree: &SNodeTree,
        path: &[NodeId],
        target: &CompiledNode,
        coords: &Coords,
        mode: Mode,
    ) -> Result<Option<Address>, AccessError> {
        let mut cell = self.root;
        for &id in path.iter().skip(1) {
            let node = &tree.nodes()[id.index()];
            let slot = cell.add(node.offset_bytes_in_parent_cell);
            match self.enter(node, slot, target, coords, mode)? {
                Some(c) => cell = c,
                None => return Ok(None),
            }
        }
        Ok(Some(cell))
    }

    /// Cell of `node` inside its container at `slot`.
    fn enter(
        &mut self,
        node: &CompiledNode,
        slot: Address,
        target: &CompiledNode,
        coords: &Coords,
        mode: Mode,
    ) -> Result<Option<Address>, AccessError> {
        let cs = node.cell_size_bytes;
        match node.container {
            ContainerLayout::Dense => Ok(Some(slot.add(linear(target, node, coords) * cs))),
            ContainerLayout::Bitmasked { mask_offset } => {
                let lin = linear(target, node, coords);
                let word_addr = slot.add(mask_offset + (lin / 64) * 8);
                let bit = 1u64 << (lin % 64);
                let word = self.segments.read_u64(word_addr);
                if word & bit == 0 {
                    if mode == Mode::Lookup {
                        return Ok(None);
                    }
                    self.segments.write_u64(word_addr, word | bit);
                }
                Ok(Some(slot.add(lin * cs)))
            }
            ContainerLayout::Pointer => {
                let ptr_addr = slot.add(linear(target, node, coords) * 8);
                let block = Address::from_raw(self.segments.read_u64(ptr_addr));
                if !block.is_null() {
                    return Ok(Some(block));
                }
                if mode == Mode::Lookup {
                    return Ok(None);
                }
                let block = self.alloc(node)?;
                self.segments.write_u64(ptr_addr, block.raw());
                Ok(Some(block))
            }
            ContainerLayout::Dynamic { .. } => {
                let axis = node.kind.axes()[0];
                let e = digit(target, node, axis, coords);
                let len = u64::from(self.segments.read_u32(slot));
                if e >= len {
                    if mode == Mode::Lookup {
                        return Ok(None);
                    }
                    self.grow(node, slot, (e + 1) as u32)?;
                }
                Ok(Some(self.element(node, slot, e)))
            }
            ContainerLayout::Root
            | ContainerLayout::BitStruct
            | ContainerLayout::BitArray
            | ContainerLayout::Place => Ok(Some(slot)),
        }
    }

    /// Extend a dynamic list to `new_len`, allocating missing chunks.
    fn grow(
        &mut self,
        node: &CompiledNode,
        slot: Address,
        new_len: u32,
    ) -> Result<(), AccessError> {
        let capacity = chunk_capacity(node);
        let chunks = u64::from(new_len).div_ceil(capacity);
        let mut link = slot.add(8);
        for _ in 0..chunks {
            let mut next = Address::from_raw(self.segments.read_u64(link));
            if next.is_null() {
                next = self.alloc(node)?;
                self.segments.write_u64(link, next.raw());
            }
            link = next;
        }
        let len = self.segments.read_u32(slot);
        self.segments.write_u32(slot, len.max(new_len));
        Ok(())
    }

    /// Address of element `e` of a dynamic list whose chain covers it.
    fn element(&self, node: &CompiledNode, slot: Address, e: u64) -> Address {
        let capacity = chunk_capacity(node);
        let mut chunk = Address::from_raw(self.segments.read_u64(slot.add(8)));
        for _ in 0..e / capacity {
            chunk = Address::from_raw(self.segments.read_u64(chunk));
        }
        chunk.add(8 + (e % capacity) * node.cell_size_bytes)
    }

    fn alloc(&mut self, node: &CompiledNode) -> Result<Address, AccessError> {
        let allocator = self
            .allocators
            .get_mut(&node.id)
            .ok_or(AccessError::WrongKind {
                op: "allocate",
                ty: node.ty(),
            })?;
        allocator.alloc(&mut self.segments)
    }

    fn free(&mut self, node: NodeId, block: Address) {
        if let Some(allocator) = self.allocators.get_mut(&node) {
            allocator.free(block);
        }
    }

    /// Release sparse allocations nested in one cell of `node`.
    fn release_cell(&mut self, tree: &SNodeTree, node: &CompiledNode, cell: Address) {
        for &c in &node.children {
            if self.sparse_below[c.index()] {
                let child = &tree.nodes()[c.index()];
                self.release_container(tree, child, cell.add(child.offset_bytes_in_parent_cell));
            }
        }
    }

    /// Release every active cell of the container of `node` at `slot`.
    fn release_container(&mut self, tree: &SNodeTree, node: &CompiledNode, slot: Address) {
        let cs = node.cell_size_bytes;
        let n = node.cells_per_container;
        match node.container {
            ContainerLayout::Dense => {
                if self.sparse_below[node.id.index()] {
                    for lin in 0..n {
                        self.release_cell(tree, node, slot.add(lin * cs));
                    }
                }
            }
            ContainerLayout::Bitmasked { mask_offset } => {
                for w in 0..n.div_ceil(64) {
                    let word_addr = slot.add(mask_offset + w * 8);
                    let word = self.segments.read_u64(word_addr);
                    if word == 0 {
                        continue;
                    }
                    for b in 0..64 {
                        if word & (1u64 << b) != 0 {
                            self.release_cell(tree, node, slot.add((w * 64 + b) * cs));
                        }
                    }
                    self.segments.write_u64(word_addr, 0);
                }
            }
            ContainerLayout::Pointer => {
                for lin in 0..n {
                    let ptr_addr = slot.add(lin * 8);
                    let block = Address::from_raw(self.segments.read_u64(ptr_addr));
                    if block.is_null() {
                        continue;
                    }
                    self.release_cell(tree, node, block);
                    self.free(node.id, block);
                    self.segments.write_u64(ptr_addr, 0);
                }
            }
            ContainerLayout::Dynamic { .. } => {
                let len = u64::from(self.segments.read_u32(slot));
                for e in 0..len {
                    let cell = self.element(node, slot, e);
                    self.release_cell(tree, node, cell);
                }
                let mut chunk = Address::from_raw(self.segments.read_u64(slot.add(8)));
                while !chunk.is_null() {
                    let next = Address::from_raw(self.segments.read_u64(chunk));
                    self.free(node.id, chunk);
                    chunk = next;
                }
                self.segments.zero(slot, 16);
            }
            ContainerLayout::Root
            | ContainerLayout::BitStruct
            | ContainerLayout::BitArray
            | ContainerLayout::Place => {}
        }
    }

    /// Slots of every instance of `path`'s last node inside active cells.
    fn collect_slots(
        &self,
        tree: &SNodeTree,
        path: &[NodeId],
        k: usize,
        cell: Address,
        out: &mut Vec<Address>,
    ) {
        let Some(&next) = path.get(k + 1) else {
            return;
        };
        let node = &tree.nodes()[next.index()];
        let slot = cell.add(node.offset_bytes_in_parent_cell);
        if k + 2 == path.len() {
            out.push(slot);
            return;
        }
        for c in self.active_cells(node, slot) {
            self.collect_slots(tree, path, k + 1, c, out);
        }
    }

    /// Addresses of the active cells in one container of `node`.
    fn active_cells(&self, node: &CompiledNode, slot: Address) -> Vec<Address> {
        let cs = node.cell_size_bytes;
        let n = node.cells_per_container;
        match node.container {
            ContainerLayout::Dense => (0..n).map(|lin| slot.add(lin * cs)).collect(),
            ContainerLayout::Bitmasked { mask_offset } => (0..n)
                .filter(|lin| {
                    let word = self.segments.read_u64(slot.add(mask_offset + (lin / 64) * 8));
                    word & (1u64 << (lin % 64)) != 0
                })
                .map(|lin| slot.add(lin * cs))
                .collect(),
            ContainerLayout::Pointer => (0..n)
                .map(|lin| Address::from_raw(self.segments.read_u64(slot.add(lin * 8))))
                .filter(|a| !a.is_null())
                .collect(),
            ContainerLayout::Dynamic { .. } => {
                let len = u64::from(self.segments.read_u32(slot));
                (0..len).map(|e| self.element(node, slot, e)).collect()
            }
            ContainerLayout::Root => vec![slot],
            ContainerLayout::BitStruct | ContainerLayout::BitArray | ContainerLayout::Place => {
                Vec::new()
            }
        }
    }
}

fn chunk_capacity(node: &CompiledNode) -> u64 {
    match node.container {
        ContainerLayout::Dynamic { chunk_capacity, .. } => u64::from(chunk_capacity.max(1)),
        _ => 1,
    }
}

struct DynamicInfo<'t> {
    dim: u32,
    place: Option<&'t CompiledNode>,
}

/// Check that `node` is dynamic; returns its capacity and its single place
/// child, if it has exactly one child and that child is a place node.
fn check_dynamic<'t>(
    tree: &'t SNodeTree,
    node: &CompiledNode,
    op: &'static str,
) -> Result<DynamicInfo<'t>, AccessError> {
    let ty = node.ty();
    if ty != SNodeType::Dynamic {
        return Err(AccessError::WrongKind { op, ty });
    }
    let dim = node.kind.extents().first().copied().unwrap_or(0);
    let place = match node.children.as_slice() {
        [only] => tree.node(*only).filter(|c| c.ty() == SNodeType::Place),
        _ => None,
    };
    Ok(DynamicInfo { dim, place })
}

fn parent_of<'t>(
    tree: &'t SNodeTree,
    node: &CompiledNode,
) -> Result<&'t CompiledNode, AccessError> {
    node.parent
        .and_then(|p| tree.node(p))
        .ok_or(AccessError::WrongKind {
            op: "parent",
            ty: node.ty(),
        })
}

fn place_dtype(place: &CompiledNode, op: &'static str) -> Result<DataType, AccessError> {
    let info = place.kind.place().ok_or(AccessError::WrongKind { op, ty: place.ty() })?;
    let dtype = info.member.dtype();
    value::check_accessible(dtype)?;
    Ok(dtype)
}

/// Where a bit-packed member lives within its container word.
struct BitSlot {
    word_bytes: usize,
    offset: u32,
}

fn bit_slot(
    tree: &SNodeTree,
    place: &CompiledNode,
    coords: &Coords,
) -> Result<Option<BitSlot>, AccessError> {
    let parent = parent_of(tree, place)?;
    let Some(num_bits) = parent.kind.num_bits() else {
        return Ok(None);
    };
    let base = place.kind.place().and_then(|p| p.bit_offset).unwrap_or(0);
    let offset = match parent.ty() {
        SNodeType::BitArray => {
            let bits = place.kind.place().map_or(0, |p| p.member.dtype().bits());
            base + linear(place, parent, coords) as u32 * bits
        }
        _ => base,
    };
    Ok(Some(BitSlot {
        word_bytes: (num_bits / 8) as usize,
        offset,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::resolve;
    use snode_core::{Axis, Field, LayoutConfig, SNodeTreeId};
    use snode_layout::{CompileRequest, LayoutCompiler, StructCompiler};
    use snode_tree::SNodeRegistry;

    /// root -> pointer(i: 2) -> dynamic(j: 8, chunk 2) -> place v: u32
    fn tree() -> (SNodeTree, NodeId, NodeId, NodeId) {
        let reg = SNodeRegistry::new();
        let mut d = reg.create_root(LayoutConfig::default());
        let v = Field::scalar("v", DataType::U32).unwrap();
        let ptr = d.root_mut().pointer(&[Axis::I], 2).unwrap().id();
        let list = d
            .node_mut(ptr)
            .unwrap()
            .dynamic(&[Axis::J], 8, Some(2))
            .unwrap()
            .place(&[&v])
            .unwrap()
            .id();
        let place = NodeId(list.0 + 1);
        let sealed = reg.finalize(d).unwrap();
        let tree = StructCompiler
            .compile(CompileRequest {
                tree: SNodeTreeId(0),
                sealed: &sealed,
                compile_only: false,
            })
            .unwrap();
        (tree, ptr, list, place)
    }

    fn storage(tree: &SNodeTree) -> TreeStorage {
        TreeStorage::new(tree, &RuntimeConfig::default()).unwrap()
    }

    #[test]
    fn sparse_flags_cover_ancestors() {
        let (tree, ..) = tree();
        let s = storage(&tree);
        assert!(s.sparse_below.iter().take(3).all(|&b| b));
        assert!(!s.sparse_below[3]);
    }

    #[test]
    fn growing_a_list_links_chunks() {
        let (tree, ptr, list, place) = tree();
        let mut s = storage(&tree);
        let (list, place) = (tree.node(list).unwrap(), tree.node(place).unwrap());
        let coords = resolve(place, &[1, 4]).unwrap();
        s.write(&tree, place, &coords, Scalar::UInt(9)).unwrap();

        assert_eq!(s.num_dynamically_allocated(ptr), 1);
        assert_eq!(s.num_dynamically_allocated(list.id), 3);
        let parent = resolve(tree.node(ptr).unwrap(), &[1]).unwrap();
        assert_eq!(s.length(&tree, list, &parent).unwrap(), 5);
        assert_eq!(s.read(&tree, place, &coords).unwrap(), Scalar::UInt(9));
    }

    #[test]
    fn releasing_a_pointer_cell_frees_nested_chunks() {
        let (tree, ptr, list, place) = tree();
        let mut s = storage(&tree);
        let (ptr_node, place_node) = (tree.node(ptr).unwrap(), tree.node(place).unwrap());
        s.write(&tree, place_node, &resolve(place_node, &[0, 3]).unwrap(), Scalar::UInt(1))
            .unwrap();
        assert_eq!(s.num_dynamically_allocated(list), 2);

        s.deactivate(&tree, ptr_node, &resolve(ptr_node, &[0]).unwrap())
            .unwrap();
        assert_eq!(s.num_dynamically_allocated(ptr), 0);
        assert_eq!(s.num_dynamically_allocated(list), 0);
    }
}
