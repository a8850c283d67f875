//! Per-node mapping from virtual axes to index positions and extents.
//!
//! Every node records, for each of the [`MAX_NUM_INDICES`] axes, the extent
//! it declares at its own level and the product of declared extents along
//! the path from the root. The order in which axes are first divided
//! defines the node's physical index positions: index expressions list one
//! entry per active axis in that order.

use smallvec::SmallVec;
use snode_core::{Axes, Axis, LayoutConfig, MAX_NUM_INDICES};

/// Per-axis extents of one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extractor {
    /// Whether the axis is divided at this node or above.
    pub active: bool,
    /// Extent declared at this node's level (1 when not divided here).
    pub declared: u32,
    /// Memory extent at this node's level (1 when not divided here).
    pub padded: u32,
    /// Product of declared extents from the root through this node.
    pub num_elements_from_root: u64,
}

impl Extractor {
    const INACTIVE: Self = Self {
        active: false,
        declared: 1,
        padded: 1,
        num_elements_from_root: 1,
    };
}

/// Index mapping of one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexLayout {
    extractors: [Extractor; MAX_NUM_INDICES],
    physical_index_position: Axes,
}

impl IndexLayout {
    /// Layout of a root: nothing divided.
    pub fn root() -> Self {
        Self {
            extractors: [Extractor::INACTIVE; MAX_NUM_INDICES],
            physical_index_position: SmallVec::new(),
        }
    }

    /// Layout of a child that divides `axes` by `extents`.
    ///
    /// Returns the new layout and the axes whose non-first division uses a
    /// non-power-of-two extent. `axes` must be valid and distinct.
    pub fn child(
        &self,
        axes: &[Axis],
        extents: &[u32],
        config: &LayoutConfig,
    ) -> (Self, SmallVec<[Axis; 2]>) {
        let mut extractors = self.extractors;
        for e in &mut extractors {
            e.declared = 1;
            e.padded = 1;
        }
        let mut physical_index_position = self.physical_index_position.clone();
        let mut slow = SmallVec::new();

        for (&axis, &extent) in axes.iter().zip(extents) {
            let e = &mut extractors[axis.index()];
            if e.active {
                if !extent.is_power_of_two() {
                    slow.push(axis);
                }
            } else {
                physical_index_position.push(axis);
            }
            e.active = true;
            e.declared = extent;
            e.padded = config.padded_extent(extent);
            e.num_elements_from_root = e.num_elements_from_root.saturating_mul(u64::from(extent));
        }

        (
            Self {
                extractors,
                physical_index_position,
            },
            slow,
        )
    }

    /// Extents of `axis` at this node.
    pub fn extractor(&self, axis: Axis) -> &Extractor {
        &self.extractors[axis.index()]
    }

    /// All extractors, indexed by axis number.
    pub fn extractors(&self) -> &[Extractor; MAX_NUM_INDICES] {
        &self.extractors
    }

    /// Axes in order of first division. Position `k` of an index expression
    /// addresses axis `physical_index_position()[k]`.
    pub fn physical_index_position(&self) -> &[Axis] {
        &self.physical_index_position
    }

    /// Number of entries an index expression for this node needs.
    pub fn num_active_indices(&self) -> usize {
        self.physical_index_position.len()
    }

    /// Declared shape, one entry per active index.
    pub fn shape(&self) -> SmallVec<[u64; 4]> {
        self.physical_index_position
            .iter()
            .map(|a| self.extractors[a.index()].num_elements_from_root)
            .collect()
    }

    /// Product of declared extents of `axis` from the root.
    pub fn shape_along_axis(&self, axis: Axis) -> u64 {
        self.extractors
            .get(axis.index())
            .map_or(1, |e| e.num_elements_from_root)
    }

    /// Number of memory cells one container of this node holds.
    pub fn padded_cells(&self) -> u64 {
        self.extractors
            .iter()
            .map(|e| u64::from(e.padded))
            .product()
    }

    /// Number of addressable cells one container of this node holds.
    pub fn declared_cells(&self) -> u64 {
        self.extractors
            .iter()
            .map(|e| u64::from(e.declared))
            .product()
    }
}

impl Default for IndexLayout {
    fn default() -> Self {
        Self::root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_division_orders_positions() {
        let cfg = LayoutConfig::default();
        let root = IndexLayout::root();
        let (a, _) = root.child(&[Axis::J, Axis::I], &[4, 2], &cfg);
        assert_eq!(a.physical_index_position(), &[Axis::J, Axis::I]);
        let (b, _) = a.child(&[Axis::I, Axis::K], &[8, 3], &cfg);
        assert_eq!(b.physical_index_position(), &[Axis::J, Axis::I, Axis::K]);
        assert_eq!(b.shape().as_slice(), &[4, 16, 3]);
    }

    #[test]
    fn padding_applies_to_memory_extent_only() {
        let (a, _) = IndexLayout::root().child(&[Axis::I], &[5], &LayoutConfig::default());
        assert_eq!(a.extractor(Axis::I).declared, 5);
        assert_eq!(a.extractor(Axis::I).padded, 8);
        assert_eq!(a.padded_cells(), 8);
        assert_eq!(a.declared_cells(), 5);
        assert_eq!(a.shape().as_slice(), &[5]);

        let (p, _) = IndexLayout::root().child(&[Axis::I], &[5], &LayoutConfig::packed());
        assert_eq!(p.padded_cells(), 5);
    }

    #[test]
    fn non_pot_non_first_division_is_reported() {
        let cfg = LayoutConfig::default();
        let (a, slow) = IndexLayout::root().child(&[Axis::I], &[3], &cfg);
        assert!(slow.is_empty());
        let (_, slow) = a.child(&[Axis::I], &[3], &cfg);
        assert_eq!(slow.as_slice(), &[Axis::I]);
        let (_, slow) = a.child(&[Axis::I], &[4], &cfg);
        assert!(slow.is_empty());
    }

    #[test]
    fn level_extents_reset_per_child() {
        let cfg = LayoutConfig::default();
        let (a, _) = IndexLayout::root().child(&[Axis::I], &[4], &cfg);
        let (leaf, _) = a.child(&[], &[], &cfg);
        assert_eq!(leaf.extractor(Axis::I).declared, 1);
        assert!(leaf.extractor(Axis::I).active);
        assert_eq!(leaf.shape_along_axis(Axis::I), 4);
        assert_eq!(leaf.shape_along_axis(Axis::J), 1);
    }
}
