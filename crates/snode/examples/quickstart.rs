//! Snode Quickstart: a sparse particle grid from scratch.
//!
//! Demonstrates:
//!   1. Declaring fields (a scalar density and a per-cell particle list)
//!   2. Building a tree: pointer blocks over dense cells, plus dynamic lists
//!   3. Finalizing and querying the compiled layout
//!   4. Writing, activating, appending and deactivating at runtime
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example quickstart

use snode::prelude::*;
use tracing_subscriber::EnvFilter;

// ─── Grid parameters ────────────────────────────────────────────

const BLOCKS: u32 = 4;
const BLOCK_SIZE: u32 = 8;
const MAX_PARTICLES: u32 = 32;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let runtime = Runtime::new(RuntimeConfig::default())?;

    // ─── Fields ─────────────────────────────────────────────────
    let density = Field::scalar("density", DataType::F32)?;
    let mass = Field::scalar("mass", DataType::F32)?;

    // ─── Tree ───────────────────────────────────────────────────
    //
    // root
    // ├── pointer(ij: 4x4)
    // │   └── dense(ij: 8x8) -> density
    // └── dense(i: 16)
    //     └── dynamic(j: 32) -> mass
    let mut fb = runtime.fields_builder();
    fb.pointer(&Axis::IJ, BLOCKS)?
        .dense(&Axis::IJ, BLOCK_SIZE)?
        .place(&[&density])?;
    let cells = fb.dense(&[Axis::I], BLOCKS * BLOCKS)?.id();
    fb.node_mut(cells)?
        .dynamic(&[Axis::J], MAX_PARTICLES, Some(8))?
        .place(&[&mass])?;
    let root = fb.finalize(true)?;

    let d = runtime
        .snode_of(&density.members()[0])
        .ok_or("density not placed")?;
    let m = runtime
        .snode_of(&mass.members()[0])
        .ok_or("mass not placed")?;
    let lists = m.parent(1).ok_or("mass has no parent")?;

    println!("tree 0: {} nodes, root cell {} bytes", root.tree().len(), root.cell_size_bytes());
    println!("density: {d}");
    println!("mass:    {m}");

    // ─── Runtime ────────────────────────────────────────────────
    runtime.write(&d, &[3, 5], 1.25f32)?;
    runtime.write(&d, &[30, 30], 0.5f32)?;
    let blocks = d.parent(2).ok_or("density has no block level")?;
    println!(
        "active blocks after two writes: {}",
        runtime.num_dynamically_allocated(&blocks)?
    );
    println!("density[3, 5] = {:?}", runtime.read(&d, &[3, 5])?);
    println!("density[12, 12] active: {}", runtime.is_active(&d, &[12, 12])?);

    for k in 0..10 {
        runtime.append(&lists, &[7], 0.1f32 * k as f32)?;
    }
    println!(
        "particles in cell 7: {} ({} chunks)",
        runtime.length(&lists, &[7])?,
        runtime.num_dynamically_allocated(&lists)?
    );

    runtime.deactivate_all(&root)?;
    println!(
        "after deactivate_all: {} blocks, {} particles in cell 7",
        runtime.num_dynamically_allocated(&blocks)?,
        runtime.length(&lists, &[7])?
    );
    Ok(())
}
