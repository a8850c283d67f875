//! Layout compilation for structured-node trees.
//!
//! A [`LayoutCompiler`] turns a [`SealedTree`](snode_tree::SealedTree) into
//! an immutable [`SNodeTree`]: per-node cell sizes, slot offsets and
//! container sizes, plus a table from placed members to their leaves.
//! [`SNode`] handles name nodes of compiled trees and answer the
//! finalized-only queries (`shape`, `cell_size_bytes`, ...).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod compiler;
pub mod descriptor;
pub mod handle;

pub use compiler::{CompileRequest, LayoutCompiler, StructCompiler};
pub use descriptor::{
    CompiledNode, ContainerLayout, SNodeTree, ADDRESS_BYTES, CHUNK_LINK_BYTES,
    DYNAMIC_HEADER_BYTES,
};
pub use handle::{rescale_index, SNode};
