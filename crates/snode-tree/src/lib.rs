//! Editable structured-node trees.
//!
//! A tree is built top-down from an implicit root by structural calls on
//! [`NodeMut`] handles: `dense`, `pointer`, `bitmasked`, `dynamic`,
//! `bit_struct`, `bit_array`, and finally `place`, which binds field
//! members to leaves. The [`SNodeRegistry`] issues root handles and seals
//! a draft exactly once, handing a [`SealedTree`] to layout compilation.
//!
//! ```text
//! SNodeRegistry ──create_root──▶ SNodeTreeDraft ──finalize──▶ SealedTree
//!                                 └── DraftNode[] (arena, NodeId = index)
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod draft;
pub mod index;
pub mod kind;
pub mod ops;
pub mod registry;

pub use draft::{NodeRef, SNodeTreeDraft};
pub use index::{Extractor, IndexLayout};
pub use kind::{Extents, PlaceInfo, SNodeKind, SharedExponent};
pub use ops::{Dims, NodeMut, Offset, PlaceOptions, BIT_CONTAINER_WIDTHS};
pub use registry::{SNodeRegistry, SealedTree};
