//! Test utilities for Corral development.
//!
//! Provides a standard particle schema, deterministic snapshot
//! generators, a runner that executes one closure per rank on its own
//! thread, and an in-memory [`CheckpointStore`](corral_store::CheckpointStore).

#![forbid(unsafe_code)]

pub mod checkpoint;
pub mod fixtures;
pub mod ranks;

pub use checkpoint::{MemoryCheckpoint, MemoryCheckpointError};
pub use fixtures::{
    gids_for_rank, position_of, random_snapshot, test_config, test_schema, uniform_snapshot,
    weight_of, GID_BASE, PID_STRIDE,
};
pub use ranks::{run_ranks, run_ranks_with};
