//! Benchmark profiles for structured-node trees.
//!
//! - [`grid_profile`]: a 2-level sparse grid, `pointer(ij) -> dense(ij)`,
//!   holding one `f32` per cell.
//! - [`particle_profile`]: one dynamic list of particle masses per coarse
//!   cell.
//! - [`scatter_indices`]: deterministic cell selection via seed.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use snode_core::{Axis, DataType, Field, SNodeError};
use snode_layout::SNode;
use snode_runtime::Runtime;

/// A finalized grid: `side * side` cells split into pointer blocks of
/// `block * block` dense cells.
pub struct GridProfile {
    /// Root of the tree.
    pub root: SNode,
    /// The pointer level.
    pub blocks: SNode,
    /// The `f32` place node.
    pub value: SNode,
    /// Cells per axis.
    pub side: u32,
}

/// Build a grid of `side * side` cells with `block`-wide pointer blocks.
///
/// `side` must be a multiple of `block`.
pub fn grid_profile(runtime: &Runtime, side: u32, block: u32) -> Result<GridProfile, SNodeError> {
    let field = Field::scalar("value", DataType::F32)?;
    let mut fb = runtime.fields_builder();
    let blocks = fb.pointer(&Axis::IJ, side / block)?.id();
    let value = fb
        .node_mut(blocks)?
        .dense(&Axis::IJ, block)?
        .place(&[&field])?
        .into_ref()
        .child_ids()[0];
    let root = fb.finalize(true)?;
    let tree = root.tree().clone();
    let missing = || SNodeError::invalid("node missing from compiled tree");
    Ok(GridProfile {
        blocks: SNode::new(tree.clone(), blocks).ok_or_else(missing)?,
        value: SNode::new(tree, value).ok_or_else(missing)?,
        root,
        side,
    })
}

/// A finalized particle store: `cells` coarse cells, each with a list of at
/// most `capacity` masses.
pub struct ParticleProfile {
    /// Root of the tree.
    pub root: SNode,
    /// The dynamic level.
    pub lists: SNode,
    /// List capacity.
    pub capacity: u32,
}

/// Build a particle store of `cells` lists.
pub fn particle_profile(
    runtime: &Runtime,
    cells: u32,
    capacity: u32,
) -> Result<ParticleProfile, SNodeError> {
    let mass = Field::scalar("mass", DataType::F32)?;
    let mut fb = runtime.fields_builder();
    let dense = fb.dense(&[Axis::I], cells)?.id();
    let lists = fb
        .node_mut(dense)?
        .dynamic(&[Axis::J], capacity, Some(capacity.min(32)))?
        .place(&[&mass])?
        .id();
    let root = fb.finalize(true)?;
    let lists = SNode::new(root.tree().clone(), lists)
        .ok_or_else(|| SNodeError::invalid("node missing from compiled tree"))?;
    Ok(ParticleProfile {
        root,
        lists,
        capacity,
    })
}

/// `n` distinct cell indices in `0..cell_count`, chosen deterministically
/// from `seed`.
pub fn scatter_indices(cell_count: usize, n: usize, seed: u64) -> Vec<usize> {
    let n = n.min(cell_count);
    let mut picked = Vec::with_capacity(n);
    let mut occupied = vec![false; cell_count];

    for i in 0..n {
        let mut pos = (seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add((i as u64).wrapping_mul(1442695040888963407))
            % cell_count as u64) as usize;
        // Linear probe to avoid collisions
        while occupied[pos] {
            pos = (pos + 1) % cell_count;
        }
        occupied[pos] = true;
        picked.push(pos);
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_profile_builds() {
        let rt = Runtime::default();
        let g = grid_profile(&rt, 64, 8).unwrap();
        assert_eq!(g.value.shape().as_slice(), &[64, 64]);
        assert_eq!(g.blocks.shape().as_slice(), &[8, 8]);
    }

    #[test]
    fn particle_profile_builds() {
        let rt = Runtime::default();
        let p = particle_profile(&rt, 16, 64).unwrap();
        assert_eq!(p.lists.chunk_size(), Some(32));
        assert_eq!(rt.length(&p.lists, &[3]).unwrap(), 0);
    }

    #[test]
    fn scatter_indices_are_distinct_and_deterministic() {
        let a = scatter_indices(100, 10, 42);
        assert_eq!(a, scatter_indices(100, 10, 42));
        let mut sorted = a.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 10);
        assert!(a.iter().all(|&i| i < 100));
    }
}
