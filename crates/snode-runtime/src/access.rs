//! Index expressions: validation and per-level decomposition.
//!
//! An index expression lists one coordinate per active index of a node, in
//! physical-index-position order. After subtracting place offsets and
//! checking bounds it becomes a per-axis coordinate vector ([`Coords`]).
//! Each level on the path then takes its digit of every axis it divides:
//! `(coord / extent_below) % declared_extent`, where `extent_below` is the
//! product of declared extents of that axis at deeper levels down to the
//! addressed node.

use snode_core::{AccessError, Axis, MAX_NUM_INDICES};
use snode_layout::CompiledNode;

/// Per-axis coordinates, indexed by axis number.
pub type Coords = [u64; MAX_NUM_INDICES];

/// Validate `indices` against the index space of `space`.
pub fn resolve(space: &CompiledNode, indices: &[i32]) -> Result<Coords, AccessError> {
    let positions = space.index.physical_index_position();
    if indices.len() != positions.len() {
        return Err(AccessError::IndexArity {
            expected: positions.len(),
            got: indices.len(),
        });
    }
    let shape = space.index.shape();
    let offsets: &[i32] = space
        .kind
        .place()
        .map_or(&[], |p| p.index_offsets.as_slice());

    let mut coords = [0u64; MAX_NUM_INDICES];
    for (k, (&axis, &i)) in positions.iter().zip(indices).enumerate() {
        let lower = offsets.get(k).copied().map_or(0, i64::from);
        let extent = shape[k] as i64;
        let v = i64::from(i) - lower;
        if v < 0 || v >= extent {
            return Err(AccessError::IndexOutOfBounds {
                position: k,
                index: i64::from(i),
                lower,
                upper: lower + extent,
            });
        }
        coords[axis.index()] = v as u64;
    }
    Ok(coords)
}

/// Digit of `axis` taken by `level` when addressing a cell of `target`.
///
/// `target` must be `level` or one of its descendants.
pub fn digit(target: &CompiledNode, level: &CompiledNode, axis: Axis, coords: &Coords) -> u64 {
    let at_level = level.index.extractor(axis);
    let below = target.index.extractor(axis).num_elements_from_root
        / at_level.num_elements_from_root.max(1);
    (coords[axis.index()] / below.max(1)) % u64::from(at_level.declared.max(1))
}

/// Row-major cell number inside one container of `level`, using memory
/// (padded) extents.
pub fn linear(target: &CompiledNode, level: &CompiledNode, coords: &Coords) -> u64 {
    level.kind.axes().iter().fold(0, |lin, &axis| {
        let padded = u64::from(level.index.extractor(axis).padded);
        lin * padded + digit(target, level, axis, coords)
    })
}
