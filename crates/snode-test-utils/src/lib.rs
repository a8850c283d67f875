//! Test utilities for snode development.
//!
//! Provides small runtimes and the standard trees used across the
//! workspace's integration tests and benchmarks. See [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{
    bit_packed, pointer_grid, sparse_list, BitPacked, PointerGrid, SparseList,
};

use snode_core::{DataType, Field, FieldMember, NodeId};
use snode_layout::SNode;
use snode_runtime::{Runtime, RuntimeConfig};

/// Segment size of [`small_runtime`]: 64 KiB.
pub const SMALL_SEGMENT_BYTES: usize = 64 * 1024;

/// A runtime with small segments so pool growth is exercised.
pub fn small_runtime() -> Runtime {
    Runtime::new(RuntimeConfig {
        segment_bytes: SMALL_SEGMENT_BYTES,
        max_segments: 16,
        ..RuntimeConfig::default()
    })
    .expect("small runtime config is valid")
}

/// A scalar field named `name`.
pub fn scalar(name: &str, dtype: DataType) -> Field {
    Field::scalar(name, dtype).expect("valid scalar field")
}

/// A signed quantized integer type of `bits` bits.
pub fn quant_int(bits: u8) -> DataType {
    DataType::QuantInt { bits, signed: true }
}

/// Handle of node `id` in the tree of `root`.
pub fn node(root: &SNode, id: NodeId) -> SNode {
    SNode::new(root.tree().clone(), id).expect("node exists in tree")
}

/// Place node of the first member of `field`.
pub fn place_of(runtime: &Runtime, field: &Field) -> SNode {
    member_place(runtime, &field.members()[0])
}

/// Place node of `member`.
pub fn member_place(runtime: &Runtime, member: &FieldMember) -> SNode {
    runtime
        .snode_of(member)
        .expect("member placed in a finalized tree")
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
