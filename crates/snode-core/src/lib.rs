//! Core types for structured-node (SNode) layout trees.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the rest of the workspace: identifiers and
//! axes, element data types, host-declared fields, error types, and the
//! layout configuration.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod dtype;
pub mod error;
pub mod field;
pub mod id;
pub mod node_type;

pub use config::LayoutConfig;
pub use dtype::{DataType, Scalar};
pub use error::{AccessError, ConfigError, SNodeError};
pub use field::{Field, FieldDecl, FieldMember, MemberLayout, Place, Placement};
pub use id::{Axes, Axis, FieldMemberId, Index, NodeId, RootId, SNodeTreeId, MAX_NUM_INDICES};
pub use node_type::SNodeType;
