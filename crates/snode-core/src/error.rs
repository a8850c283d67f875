//! Error types for tree construction, finalization and runtime access.
//!
//! Organized by subsystem: building and finalizing trees
//! ([`SNodeError`]), sparse runtime operations ([`AccessError`]) and
//! runtime configuration ([`ConfigError`]).

use std::error::Error;
use std::fmt;

use crate::dtype::DataType;
use crate::id::SNodeTreeId;
use crate::node_type::SNodeType;

/// Errors from structural calls, placement and finalization.
///
/// A failing call never leaves partial changes behind: validation runs
/// before the tree is mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SNodeError {
    /// The builder was already finalized.
    Finalized,
    /// An argument was malformed (dimension/axis mismatch, illegal
    /// placement, re-placement of a member, bit capacity overflow).
    InvalidArgument {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// The requested node kind or operation is not supported.
    Unsupported {
        /// What was requested.
        reason: String,
    },
    /// Storage for the finalized tree could not be allocated.
    AllocationFailed {
        /// Bytes requested.
        requested: usize,
        /// Bytes available to the pool.
        capacity: usize,
    },
}

impl SNodeError {
    /// Shorthand for [`SNodeError::InvalidArgument`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SNodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finalized => write!(f, "fields builder finalized"),
            Self::InvalidArgument { reason } => write!(f, "invalid argument: {reason}"),
            Self::Unsupported { reason } => write!(f, "unsupported: {reason}"),
            Self::AllocationFailed {
                requested,
                capacity,
            } => write!(
                f,
                "allocation failed: requested {requested} bytes, capacity {capacity} bytes"
            ),
        }
    }
}

impl Error for SNodeError {}

/// Errors from sparse runtime operations on a finalized tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessError {
    /// The tree id is not registered with this runtime.
    UnknownTree {
        /// The unrecognised tree.
        tree: SNodeTreeId,
    },
    /// The node handle was issued by a different runtime.
    ForeignNode,
    /// The tree was destroyed and its storage released.
    TreeDestroyed {
        /// The destroyed tree.
        tree: SNodeTreeId,
    },
    /// The tree was finalized compile-only and has no storage.
    NotMaterialized {
        /// The layout-only tree.
        tree: SNodeTreeId,
    },
    /// The operation does not apply to this node kind.
    WrongKind {
        /// Operation name.
        op: &'static str,
        /// Kind of the node it was issued on.
        ty: SNodeType,
    },
    /// The index expression has the wrong number of entries.
    IndexArity {
        /// Entries the node's index space needs.
        expected: usize,
        /// Entries supplied.
        got: usize,
    },
    /// An index entry is outside the node's index range.
    IndexOutOfBounds {
        /// Position within the index expression.
        position: usize,
        /// The offending value.
        index: i64,
        /// Inclusive lower bound.
        lower: i64,
        /// Exclusive upper bound.
        upper: i64,
    },
    /// The addressed cell is not active.
    Inactive,
    /// The dynamic list is at capacity.
    DynamicFull {
        /// Maximum number of elements.
        capacity: u32,
    },
    /// Values of this type cannot be read or written by the accessor.
    UnsupportedType {
        /// The member type.
        dtype: DataType,
    },
    /// The storage pool could not satisfy an allocation.
    AllocationFailed {
        /// Bytes requested.
        requested: usize,
        /// Bytes available to the pool.
        capacity: usize,
    },
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTree { tree } => write!(f, "unknown snode tree {tree}"),
            Self::ForeignNode => write!(f, "node belongs to a different runtime"),
            Self::TreeDestroyed { tree } => write!(f, "snode tree {tree} was destroyed"),
            Self::NotMaterialized { tree } => {
                write!(f, "snode tree {tree} was compiled without storage")
            }
            Self::WrongKind { op, ty } => write!(f, "{op} is not supported on {ty} nodes"),
            Self::IndexArity { expected, got } => {
                write!(f, "expected {expected} indices, got {got}")
            }
            Self::IndexOutOfBounds {
                position,
                index,
                lower,
                upper,
            } => write!(
                f,
                "index {index} at position {position} out of range [{lower}, {upper})"
            ),
            Self::Inactive => write!(f, "addressed cell is not active"),
            Self::DynamicFull { capacity } => {
                write!(f, "dynamic list is full ({capacity} elements)")
            }
            Self::UnsupportedType { dtype } => {
                write!(f, "accessors do not support values of type {dtype}")
            }
            Self::AllocationFailed {
                requested,
                capacity,
            } => write!(
                f,
                "allocation failed: requested {requested} bytes, capacity {capacity} bytes"
            ),
        }
    }
}

impl Error for AccessError {}

/// Errors detected while validating a runtime configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Segment size is zero or not a multiple of 8 bytes.
    InvalidSegmentSize {
        /// The configured size.
        configured: usize,
    },
    /// Segment larger than an address offset can span.
    SegmentTooLarge {
        /// The configured size.
        configured: usize,
        /// The largest supported size.
        max: u64,
    },
    /// The pool may not hold any segment.
    NoSegments,
    /// More segments than an address can name.
    TooManySegments {
        /// The configured count.
        configured: u16,
        /// The largest supported count.
        max: u16,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSegmentSize { configured } => write!(
                f,
                "segment size {configured} must be a non-zero multiple of 8 bytes"
            ),
            Self::SegmentTooLarge { configured, max } => {
                write!(f, "segment size {configured} exceeds the addressable {max} bytes")
            }
            Self::NoSegments => write!(f, "max_segments must be at least 1"),
            Self::TooManySegments { configured, max } => {
                write!(f, "max_segments {configured} exceeds the supported {max}")
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_carry_context() {
        let e = AccessError::IndexOutOfBounds {
            position: 1,
            index: 9,
            lower: 0,
            upper: 8,
        };
        assert_eq!(e.to_string(), "index 9 at position 1 out of range [0, 8)");

        let e = AccessError::WrongKind {
            op: "append",
            ty: SNodeType::Dense,
        };
        assert_eq!(e.to_string(), "append is not supported on dense nodes");

        assert_eq!(SNodeError::Finalized.to_string(), "fields builder finalized");
    }
}
