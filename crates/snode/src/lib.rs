//! Snode: hierarchical sparse data layouts.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! snode sub-crates. A tree of structured nodes describes how multi-dimensional
//! fields are laid out: dense blocks, pointer-indirected blocks, bitmasked
//! blocks, dynamic lists and bit-packed words, with typed fields placed at the
//! leaves.
//!
//! # Quick start
//!
//! ```rust
//! use snode::prelude::*;
//!
//! let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
//! let x = Field::scalar("x", DataType::F32).unwrap();
//!
//! // root -> pointer(i: 4) -> dense(i: 8) -> place x
//! let mut fb = runtime.fields_builder();
//! fb.pointer(&[Axis::I], 4)
//!     .and_then(|n| n.dense(&[Axis::I], 8))
//!     .and_then(|n| n.place(&[&x]))
//!     .unwrap();
//! fb.finalize(true).unwrap();
//!
//! let xs = runtime.snode_of(&x.members()[0]).unwrap();
//! assert_eq!(xs.shape().as_slice(), &[32]);
//!
//! runtime.write(&xs, &[10], 2.5f32).unwrap();
//! assert!(runtime.is_active(&xs, &[12]).unwrap());
//! assert!(!runtime.is_active(&xs, &[0]).unwrap());
//! assert_eq!(runtime.read(&xs, &[10]).unwrap(), Scalar::Float(2.5));
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `snode-core` | IDs, axes, data types, fields, errors, layout config |
//! | [`tree`] | `snode-tree` | Draft trees, structural calls, placement, registry |
//! | [`layout`] | `snode-layout` | Layout compiler, compiled trees, `SNode` handles |
//! | [`runtime`] | `snode-runtime` | Runtime, fields builder, storage and sparse ops |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, IDs and errors (`snode-core`).
pub use snode_core as types;

/// Editable draft trees and the root registry (`snode-tree`).
///
/// [`tree::NodeMut`] carries the structural calls (`dense`, `pointer`,
/// `place`, ...) used while a tree is being built.
pub use snode_tree as tree;

/// Layout compilation (`snode-layout`).
///
/// Implement [`layout::LayoutCompiler`] to supply a custom compiler to
/// [`runtime::Runtime::with_compiler`].
pub use snode_layout as layout;

/// Runtime, builder and storage (`snode-runtime`).
pub use snode_runtime as runtime;

/// Common imports for typical snode usage.
///
/// ```rust
/// use snode::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use snode_core::{
        Axis, DataType, Field, FieldDecl, LayoutConfig, MemberLayout, Place, SNodeType, Scalar,
    };

    // Errors
    pub use snode_core::{AccessError, ConfigError, SNodeError};

    // Building
    pub use snode_tree::{NodeMut, NodeRef, PlaceOptions};

    // Compiled trees
    pub use snode_layout::{SNode, SNodeTree};

    // Runtime
    pub use snode_runtime::{BuilderWarning, FieldsBuilder, Runtime, RuntimeConfig};
}
