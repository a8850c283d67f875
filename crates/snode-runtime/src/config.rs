//! Runtime configuration parameters.

use snode_core::{ConfigError, LayoutConfig};

use crate::address::{MAX_SEGMENTS, MAX_SEGMENT_BYTES};

/// Configuration of a [`Runtime`](crate::Runtime).
///
/// Controls the layout mode of trees built against the runtime and the
/// sizing of each tree's storage pool. Validated at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Layout mode captured by every builder of this runtime.
    pub layout: LayoutConfig,

    /// Size of one storage segment in bytes.
    ///
    /// Default: 16 MiB. Must be a non-zero multiple of 8 and at most
    /// [`MAX_SEGMENT_BYTES`](crate::address::MAX_SEGMENT_BYTES). A single
    /// allocation (a root container, a pointer block, a dynamic chunk)
    /// never spans segments, so this bounds the largest allocation.
    pub segment_bytes: usize,

    /// Maximum number of segments per tree.
    ///
    /// Default: 64, so 1 GiB per tree at the default segment size.
    pub max_segments: u16,
}

impl RuntimeConfig {
    /// Default segment size: 16 MiB.
    pub const DEFAULT_SEGMENT_BYTES: usize = 16 * 1024 * 1024;

    /// Default maximum segment count.
    pub const DEFAULT_MAX_SEGMENTS: u16 = 64;

    /// Check the sizing parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment_bytes == 0 || self.segment_bytes % 8 != 0 {
            return Err(ConfigError::InvalidSegmentSize {
                configured: self.segment_bytes,
            });
        }
        if self.segment_bytes as u64 > MAX_SEGMENT_BYTES {
            return Err(ConfigError::SegmentTooLarge {
                configured: self.segment_bytes,
                max: MAX_SEGMENT_BYTES,
            });
        }
        if self.max_segments == 0 {
            return Err(ConfigError::NoSegments);
        }
        if self.max_segments > MAX_SEGMENTS {
            return Err(ConfigError::TooManySegments {
                configured: self.max_segments,
                max: MAX_SEGMENTS,
            });
        }
        Ok(())
    }

    /// Upper bound of one tree's storage in bytes.
    pub fn capacity_bytes(&self) -> usize {
        self.segment_bytes.saturating_mul(usize::from(self.max_segments))
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            segment_bytes: Self::DEFAULT_SEGMENT_BYTES,
            max_segments: Self::DEFAULT_MAX_SEGMENTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capacity_bytes(), 1024 * 1024 * 1024);
    }

    #[test]
    fn unaligned_segment_rejected() {
        let config = RuntimeConfig {
            segment_bytes: 1001,
            ..RuntimeConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidSegmentSize { configured: 1001 })
        );
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn segment_must_fit_address_offsets() {
        let largest = RuntimeConfig {
            segment_bytes: MAX_SEGMENT_BYTES as usize,
            max_segments: 1,
            ..RuntimeConfig::default()
        };
        assert!(largest.validate().is_ok());
        let too_large = RuntimeConfig {
            segment_bytes: MAX_SEGMENT_BYTES as usize + 8,
            max_segments: 1,
            ..RuntimeConfig::default()
        };
        assert_eq!(
            too_large.validate(),
            Err(ConfigError::SegmentTooLarge {
                configured: MAX_SEGMENT_BYTES as usize + 8,
                max: MAX_SEGMENT_BYTES,
            })
        );
    }

    #[test]
    fn segment_count_bounds() {
        let none = RuntimeConfig {
            max_segments: 0,
            ..RuntimeConfig::default()
        };
        assert_eq!(none.validate(), Err(ConfigError::NoSegments));
        let many = RuntimeConfig {
            max_segments: MAX_SEGMENTS + 1,
            ..RuntimeConfig::default()
        };
        assert!(matches!(
            many.validate(),
            Err(ConfigError::TooManySegments { .. })
        ));
    }
}
