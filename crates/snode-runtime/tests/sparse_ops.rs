//! Integration tests: activation, deactivation and dynamic lists on
//! materialized trees.

use snode_core::{AccessError, Axis, DataType, Scalar, SNodeType};
use snode_runtime::FieldsBuilder;
use snode_test_utils::fixtures::{LIST_CAPACITY, LIST_CHUNK};
use snode_test_utils::{node, place_of, pointer_grid, scalar, small_runtime, sparse_list};

// ── pointer / dense ─────────────────────────────────────────────

#[test]
fn pointer_cell_activates_whole_block() {
    let rt = small_runtime();
    let g = pointer_grid(&rt);
    assert_eq!(g.x.shape().as_slice(), &[32]);
    assert!(!rt.is_active(&g.x, &[10]).unwrap());

    rt.activate(&g.x, &[10]).unwrap();
    // 10 and 8..16 share pointer cell 1.
    assert!(rt.is_active(&g.x, &[10]).unwrap());
    assert!(rt.is_active(&g.x, &[8]).unwrap());
    assert!(rt.is_active(&g.x, &[15]).unwrap());
    assert!(!rt.is_active(&g.x, &[7]).unwrap());
    assert!(!rt.is_active(&g.x, &[16]).unwrap());
    assert!(rt.is_active(&g.pointer, &[1]).unwrap());
    assert_eq!(rt.num_dynamically_allocated(&g.pointer).unwrap(), 1);
}

#[test]
fn deactivate_releases_pointer_block() {
    let rt = small_runtime();
    let g = pointer_grid(&rt);
    rt.write(&g.x, &[10], 4.5f32).unwrap();
    rt.activate(&g.x, &[30]).unwrap();
    assert_eq!(rt.num_dynamically_allocated(&g.pointer).unwrap(), 2);

    rt.deactivate(&g.pointer, &[1]).unwrap();
    assert!(!rt.is_active(&g.x, &[10]).unwrap());
    assert!(rt.is_active(&g.x, &[30]).unwrap());
    assert_eq!(rt.num_dynamically_allocated(&g.pointer).unwrap(), 1);
    assert_eq!(rt.read(&g.x, &[10]).unwrap(), Scalar::Float(0.0));

    // Deactivating an inactive cell is a no-op.
    rt.deactivate(&g.pointer, &[1]).unwrap();
    assert_eq!(rt.num_dynamically_allocated(&g.pointer).unwrap(), 1);
}

#[test]
fn freed_pointer_blocks_are_reused() {
    let rt = small_runtime();
    let g = pointer_grid(&rt);
    rt.activate(&g.x, &[0]).unwrap();
    let used = rt.used_bytes(&g.root).unwrap();
    rt.deactivate(&g.pointer, &[0]).unwrap();
    rt.activate(&g.x, &[31]).unwrap();
    assert_eq!(rt.used_bytes(&g.root).unwrap(), used);
    assert_eq!(rt.num_dynamically_allocated(&g.pointer).unwrap(), 1);
}

#[test]
fn deactivate_requires_sparse_node() {
    let rt = small_runtime();
    let g = pointer_grid(&rt);
    assert_eq!(
        rt.deactivate(&g.dense, &[0]),
        Err(AccessError::WrongKind {
            op: "deactivate",
            ty: SNodeType::Dense
        })
    );
}

#[test]
fn index_expressions_are_checked() {
    let rt = small_runtime();
    let g = pointer_grid(&rt);
    assert!(matches!(
        rt.activate(&g.x, &[32]),
        Err(AccessError::IndexOutOfBounds { position: 0, .. })
    ));
    assert_eq!(
        rt.activate(&g.x, &[1, 2]),
        Err(AccessError::IndexArity {
            expected: 1,
            got: 2
        })
    );
}

#[test]
fn deactivate_all_clears_every_pointer_cell() {
    let rt = small_runtime();
    let g = pointer_grid(&rt);
    for i in [0, 9, 18, 27] {
        rt.activate(&g.x, &[i]).unwrap();
    }
    assert_eq!(rt.num_dynamically_allocated(&g.pointer).unwrap(), 4);

    rt.deactivate_all(&g.root).unwrap();
    for i in 0..32 {
        assert!(!rt.is_active(&g.x, &[i]).unwrap());
    }
    assert_eq!(rt.num_dynamically_allocated(&g.pointer).unwrap(), 0);
}

#[test]
fn activating_a_dense_parent_opens_its_2d_block() {
    let rt = small_runtime();
    let y = scalar("y", DataType::F32);
    let mut fb = rt.fields_builder();
    let blocks = fb
        .pointer(&Axis::IJ, 4)
        .and_then(|n| n.dense(&Axis::IJ, 2))
        .and_then(|n| n.place(&[&y]))
        .unwrap()
        .into_ref()
        .parent(1)
        .unwrap()
        .id();
    let root = fb.finalize(true).unwrap();
    let blocks = node(&root, blocks);
    let ys = place_of(&rt, &y);
    assert_eq!(ys.shape().as_slice(), &[8, 8]);
    for (i, j) in [(0, 0), (1, 1), (7, 7), (3, 5)] {
        assert!(!rt.is_active(&ys, &[i, j]).unwrap());
    }

    let cells = ys.parent(1).unwrap();
    rt.activate(&cells, &[0, 0]).unwrap();
    assert!(rt.is_active(&blocks, &[0, 0]).unwrap());
    assert!(!rt.is_active(&blocks, &[0, 1]).unwrap());
    assert_eq!(rt.num_dynamically_allocated(&blocks).unwrap(), 1);

    // The whole 2x2 dense block under pointer cell (0, 0) is addressable.
    for (i, j) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
        assert!(rt.is_active(&ys, &[i, j]).unwrap());
        assert!(rt.get_addr(&ys, &[i, j]).is_ok());
    }
    assert!(!rt.is_active(&ys, &[2, 0]).unwrap());
    assert!(!rt.is_active(&ys, &[0, 2]).unwrap());
    rt.write(&ys, &[1, 0], 2.0f32).unwrap();
    assert_eq!(rt.read(&ys, &[1, 0]).unwrap(), Scalar::Float(2.0));
    assert_eq!(rt.num_dynamically_allocated(&blocks).unwrap(), 1);
}

#[test]
fn deactivate_all_clears_pointer_and_dynamic_in_one_tree() {
    let rt = small_runtime();
    let x = scalar("x", DataType::F32);
    let m = scalar("m", DataType::I32);
    let mut fb = rt.fields_builder();
    let pointer = fb.pointer(&[Axis::I], 4).unwrap().id();
    fb.node_mut(pointer)
        .and_then(|n| n.dense(&[Axis::I], 4))
        .and_then(|n| n.place(&[&x]))
        .unwrap();
    let cells = fb.dense(&[Axis::J], 4).unwrap().id();
    let list = fb
        .node_mut(cells)
        .and_then(|n| n.dynamic(&[Axis::K], 16, Some(4)))
        .and_then(|n| n.place(&[&m]))
        .unwrap()
        .id();
    let root = fb.finalize(true).unwrap();
    let pointer = node(&root, pointer);
    let list = node(&root, list);
    let xs = place_of(&rt, &x);

    for i in [1, 6, 13] {
        rt.write(&xs, &[i], 1.0f32).unwrap();
    }
    for j in 0..4 {
        for k in 0..=j {
            rt.append(&list, &[j], k).unwrap();
        }
    }
    assert_eq!(rt.num_dynamically_allocated(&pointer).unwrap(), 3);
    assert_eq!(rt.length(&list, &[3]).unwrap(), 4);

    rt.deactivate_all(&root).unwrap();
    for i in 0..4 {
        assert!(!rt.is_active(&pointer, &[i]).unwrap());
    }
    for i in 0..16 {
        assert!(!rt.is_active(&xs, &[i]).unwrap());
    }
    for j in 0..4 {
        assert_eq!(rt.length(&list, &[j]).unwrap(), 0);
    }
    assert_eq!(rt.num_dynamically_allocated(&pointer).unwrap(), 0);
    assert_eq!(rt.num_dynamically_allocated(&list).unwrap(), 0);
}

#[test]
fn num_dynamically_allocated_is_zero_for_dense() {
    let rt = small_runtime();
    let g = pointer_grid(&rt);
    rt.activate(&g.x, &[3]).unwrap();
    assert_eq!(rt.num_dynamically_allocated(&g.dense).unwrap(), 0);
    assert_eq!(rt.num_dynamically_allocated(&g.x).unwrap(), 0);
}

// ── bitmasked ───────────────────────────────────────────────────

#[test]
fn bitmasked_cells_toggle_independently() {
    let rt = small_runtime();
    let x = scalar("x", DataType::I32);
    let mut fb = rt.fields_builder();
    let bm = fb
        .bitmasked(&[Axis::I], 100)
        .and_then(|n| n.place(&[&x]))
        .unwrap()
        .id();
    let root = fb.finalize(true).unwrap();
    let bm = node(&root, bm);
    let xs = place_of(&rt, &x);

    rt.write(&xs, &[70], 5).unwrap();
    assert!(rt.is_active(&bm, &[70]).unwrap());
    assert!(!rt.is_active(&bm, &[69]).unwrap());
    assert_eq!(rt.read(&xs, &[70]).unwrap(), Scalar::Int(5));

    rt.deactivate(&bm, &[70]).unwrap();
    assert!(!rt.is_active(&xs, &[70]).unwrap());
    // Deactivated cells are cleared.
    rt.activate(&bm, &[70]).unwrap();
    assert_eq!(rt.read(&xs, &[70]).unwrap(), Scalar::Int(0));
    assert_eq!(rt.num_dynamically_allocated(&bm).unwrap(), 0);
}

// ── dynamic ─────────────────────────────────────────────────────

#[test]
fn append_then_length() {
    let rt = small_runtime();
    let l = sparse_list(&rt);
    assert_eq!(rt.length(&l.list, &[2]).unwrap(), 0);
    for k in 0..5 {
        assert_eq!(rt.append(&l.list, &[2], 10 * k).unwrap(), k as u32);
    }
    assert_eq!(rt.length(&l.list, &[2]).unwrap(), 5);
    assert_eq!(rt.length(&l.list, &[1]).unwrap(), 0);
    // Element 4 lives in the second chunk.
    assert_eq!(rt.read(&l.m, &[2, 4]).unwrap(), Scalar::Int(40));
    assert_eq!(rt.read(&l.m, &[2, 0]).unwrap(), Scalar::Int(0));
    assert_eq!(rt.read(&l.m, &[2, 3]).unwrap(), Scalar::Int(30));
    assert_eq!(
        rt.num_dynamically_allocated(&l.list).unwrap(),
        5usize.div_ceil(LIST_CHUNK as usize)
    );
}

#[test]
fn append_fails_at_capacity() {
    let rt = small_runtime();
    let l = sparse_list(&rt);
    for k in 0..LIST_CAPACITY {
        rt.append(&l.list, &[0], k).unwrap();
    }
    assert_eq!(
        rt.append(&l.list, &[0], 99),
        Err(AccessError::DynamicFull {
            capacity: LIST_CAPACITY
        })
    );
    assert_eq!(rt.length(&l.list, &[0]).unwrap(), LIST_CAPACITY);
}

#[test]
fn writes_extend_dynamic_lists() {
    let rt = small_runtime();
    let l = sparse_list(&rt);
    rt.write(&l.m, &[1, 6], -3).unwrap();
    assert_eq!(rt.length(&l.list, &[1]).unwrap(), 7);
    assert!(rt.is_active(&l.m, &[1, 6]).unwrap());
    assert!(!rt.is_active(&l.m, &[1, 7]).unwrap());
    assert_eq!(rt.read(&l.m, &[1, 6]).unwrap(), Scalar::Int(-3));
}

#[test]
fn deactivating_an_element_clears_its_list() {
    let rt = small_runtime();
    let l = sparse_list(&rt);
    for k in 0..6 {
        rt.append(&l.list, &[3], k).unwrap();
    }
    rt.append(&l.list, &[0], 1).unwrap();
    assert_eq!(rt.num_dynamically_allocated(&l.list).unwrap(), 3);

    rt.deactivate(&l.list, &[3, 2]).unwrap();
    assert_eq!(rt.length(&l.list, &[3]).unwrap(), 0);
    assert_eq!(rt.length(&l.list, &[0]).unwrap(), 1);
    assert_eq!(rt.num_dynamically_allocated(&l.list).unwrap(), 1);
}

#[test]
fn deactivate_all_empties_every_list() {
    let rt = small_runtime();
    let l = sparse_list(&rt);
    for i in 0..4 {
        rt.append(&l.list, &[i], i).unwrap();
    }
    rt.deactivate_all(&l.list).unwrap();
    for i in 0..4 {
        assert_eq!(rt.length(&l.list, &[i]).unwrap(), 0);
    }
    assert_eq!(rt.num_dynamically_allocated(&l.list).unwrap(), 0);

    // Lists grow again from reused chunks.
    rt.append(&l.list, &[2], 8).unwrap();
    assert_eq!(rt.read(&l.m, &[2, 0]).unwrap(), Scalar::Int(8));
}

#[test]
fn append_requires_dynamic_with_single_place() {
    let rt = small_runtime();
    let l = sparse_list(&rt);
    assert!(matches!(
        rt.append(&l.dense, &[], 1),
        Err(AccessError::WrongKind { op: "append", .. })
    ));
    assert!(matches!(
        rt.length(&l.m, &[0, 0]),
        Err(AccessError::WrongKind { op: "length", .. })
    ));
}

// ── addresses, handles and tree lifetime ────────────────────────

#[test]
fn get_addr_requires_active_path() {
    let rt = small_runtime();
    let g = pointer_grid(&rt);
    assert_eq!(rt.get_addr(&g.x, &[5]), Err(AccessError::Inactive));
    rt.activate(&g.x, &[5]).unwrap();
    let a5 = rt.get_addr(&g.x, &[5]).unwrap();
    let a6 = rt.get_addr(&g.x, &[6]).unwrap();
    assert_eq!(a6 - a5, 4);
    assert_ne!(rt.get_addr(&g.root, &[]).unwrap(), 0);
}

#[test]
fn addresses_of_different_trees_differ() {
    let rt = small_runtime();
    let a = pointer_grid(&rt);
    let b = pointer_grid(&rt);
    rt.activate(&a.x, &[0]).unwrap();
    rt.activate(&b.x, &[0]).unwrap();
    assert_ne!(
        rt.get_addr(&a.x, &[0]).unwrap(),
        rt.get_addr(&b.x, &[0]).unwrap()
    );
}

#[test]
fn destroyed_tree_rejects_access() {
    let rt = small_runtime();
    let g = pointer_grid(&rt);
    let id = g.root.tree_id();
    rt.destroy_snode_tree(id).unwrap();
    assert_eq!(
        rt.activate(&g.x, &[0]),
        Err(AccessError::TreeDestroyed { tree: id })
    );
    assert_eq!(
        rt.destroy_snode_tree(id),
        Err(AccessError::TreeDestroyed { tree: id })
    );
    // Layout queries keep working.
    assert_eq!(g.x.shape().as_slice(), &[32]);
    assert!(FieldsBuilder::finalized_roots(&rt).is_empty());
}

#[test]
fn handles_from_another_runtime_are_rejected() {
    let a = small_runtime();
    let b = small_runtime();
    let g = pointer_grid(&a);
    assert_eq!(
        b.activate(&g.x, &[0]),
        Err(AccessError::UnknownTree {
            tree: g.root.tree_id()
        })
    );
    pointer_grid(&b);
    assert_eq!(b.activate(&g.x, &[0]), Err(AccessError::ForeignNode));
}
