//! Standard trees for runtime tests.
//!
//! - [`pointer_grid`]: `root -> pointer(i: 4) -> dense(i: 8) -> place x: f32`.
//! - [`sparse_list`]: `root -> dense(i: 4) -> dynamic(j: 16, chunk 4) -> place m: i32`.
//! - [`bit_packed`]: a bit struct of two quantized ints under `dense(i: 8)`
//!   and a bit array of 4-bit elements along `j`.

use snode_core::{Axis, DataType, Field};
use snode_layout::SNode;
use snode_runtime::Runtime;

use crate::{node, place_of, quant_int, scalar};

/// Pointer blocks of dense cells.
pub struct PointerGrid {
    pub root: SNode,
    pub pointer: SNode,
    pub dense: SNode,
    pub x: SNode,
    pub field: Field,
}

pub fn pointer_grid(runtime: &Runtime) -> PointerGrid {
    let field = scalar("x", DataType::F32);
    let mut fb = runtime.fields_builder();
    let pointer = fb.pointer(&[Axis::I], 4).expect("pointer").id();
    let dense = fb
        .node_mut(pointer)
        .and_then(|n| n.dense(&[Axis::I], 8))
        .and_then(|n| n.place(&[&field]))
        .expect("dense + place")
        .id();
    let root = fb.finalize(true).expect("finalize pointer grid");
    PointerGrid {
        pointer: node(&root, pointer),
        dense: node(&root, dense),
        x: place_of(runtime, &field),
        root,
        field,
    }
}

/// One dynamic list per dense cell.
pub struct SparseList {
    pub root: SNode,
    pub dense: SNode,
    pub list: SNode,
    pub m: SNode,
    pub field: Field,
}

/// Maximum length of each list in [`sparse_list`].
pub const LIST_CAPACITY: u32 = 16;

/// Elements per chunk in [`sparse_list`].
pub const LIST_CHUNK: u32 = 4;

pub fn sparse_list(runtime: &Runtime) -> SparseList {
    let field = scalar("m", DataType::I32);
    let mut fb = runtime.fields_builder();
    let dense = fb.dense(&[Axis::I], 4).expect("dense").id();
    let list = fb
        .node_mut(dense)
        .and_then(|n| n.dynamic(&[Axis::J], LIST_CAPACITY, Some(LIST_CHUNK)))
        .and_then(|n| n.place(&[&field]))
        .expect("dynamic + place")
        .id();
    let root = fb.finalize(true).expect("finalize sparse list");
    SparseList {
        dense: node(&root, dense),
        list: node(&root, list),
        m: place_of(runtime, &field),
        root,
        field,
    }
}

/// Bit-packed members.
pub struct BitPacked {
    pub root: SNode,
    /// 5-bit signed member of the bit struct.
    pub a: SNode,
    /// 11-bit signed member of the bit struct.
    pub b: SNode,
    /// 4-bit signed element of the bit array.
    pub q: SNode,
    pub fields: [Field; 3],
}

pub fn bit_packed(runtime: &Runtime) -> BitPacked {
    let a = scalar("a", quant_int(5));
    let b = scalar("b", quant_int(11));
    let q = scalar("q", quant_int(4));
    let mut fb = runtime.fields_builder();
    let cells = fb.dense(&[Axis::I], 8).expect("dense").id();
    fb.node_mut(cells)
        .and_then(|n| n.bit_struct(32))
        .and_then(|n| n.place(&[&a, &b]))
        .expect("bit struct");
    fb.bit_array(&[Axis::J], 8, 32)
        .and_then(|n| n.place(&[&q]))
        .expect("bit array");
    let root = fb.finalize(true).expect("finalize bit packed");
    BitPacked {
        a: place_of(runtime, &a),
        b: place_of(runtime, &b),
        q: place_of(runtime, &q),
        root,
        fields: [a, b, q],
    }
}
