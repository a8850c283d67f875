//! Storage, sparse activation and the fields builder for structured-node
//! trees.
//!
//! A [`Runtime`] owns every tree finalized against it. Trees are built with
//! a [`FieldsBuilder`] obtained from [`Runtime::fields_builder`]; finalizing
//! compiles the layout and allocates the tree's storage pool. The runtime
//! then answers the sparse operations (`activate`, `deactivate`,
//! `is_active`, `append`, `length`, `get_addr`, `read`, `write`) on
//! [`SNode`](snode_layout::SNode) handles.
//!
//! # Storage model
//!
//! Each materialized tree has its own pool of fixed-size byte segments.
//! The root container is allocated at finalize; pointer blocks and dynamic
//! chunks come from per-node block allocators that reuse freed blocks.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod access;
pub mod address;
pub mod allocator;
pub mod builder;
pub mod config;
pub mod runtime;
pub mod segment;
pub mod storage;
mod value;

pub use access::Coords;
pub use address::Address;
pub use allocator::BlockAllocator;
pub use builder::{BuilderWarning, FieldsBuilder};
pub use config::RuntimeConfig;
pub use runtime::Runtime;
pub use segment::{Segment, SegmentList};
pub use storage::TreeStorage;
