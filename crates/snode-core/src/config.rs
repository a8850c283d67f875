//! Layout configuration shared by tree construction and compilation.

/// Controls how declared extents map to memory.
///
/// Captured when a builder is created; every structural call of that
/// builder uses the same setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutConfig {
    /// Use declared extents verbatim.
    ///
    /// When `false` (the default) each per-level extent and dynamic chunk
    /// size is padded to the next power of two for memory layout, which
    /// lets index decomposition use shifts and masks. Reported shapes are
    /// never padded.
    pub packed: bool,
}

impl LayoutConfig {
    /// Default packing mode.
    pub const DEFAULT_PACKED: bool = false;

    /// A packed layout (no power-of-two padding).
    pub fn packed() -> Self {
        Self { packed: true }
    }

    /// Memory extent for a declared extent under this configuration.
    pub fn padded_extent(&self, declared: u32) -> u32 {
        if self.packed {
            declared
        } else {
            declared.checked_next_power_of_two().unwrap_or(declared)
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            packed: Self::DEFAULT_PACKED,
        }
    }
}
