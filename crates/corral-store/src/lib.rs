//! Element-partitioned particle containers.
//!
//! A container stores particles in fixed-width blocks grouped by mesh
//! element, with every schema field kept as its own column inside a
//! block. It supports parallel iteration over all slots, local
//! reorganization ([`ParticleStore::rebuild`]) and collective
//! reorganization across a process group ([`ParticleStore::migrate`]).
//!
//! The variants ([`BlockContainer`], [`CsrContainer`], [`FlatContainer`],
//! [`TeamContainer`]) share storage and engines and differ only in how
//! they assign slots to elements.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod batch;
pub mod checkpoint;
mod chunk;
pub mod compliance;
pub mod config;
pub mod container;
mod iterate;
pub mod layout;
pub mod metrics;
mod migrate;
mod mirror;
mod rebuild;
mod record;
pub mod space;
pub mod store;
pub mod view;

#[cfg(test)]
mod testing;

pub use batch::{ParticleBatch, ParticleSnapshot};
pub use checkpoint::{CheckpointState, CheckpointStore, LEADER};
pub use config::StoreConfig;
pub use container::{
    BlockContainer, CsrContainer, FlatContainer, ParticleContainer, TeamContainer,
};
pub use layout::{
    BlockLayout, CsrLayout, FlatLayout, Layout, Placement, Plan, PlanParams, TeamLayout,
};
pub use metrics::LayoutMetrics;
pub use space::{DeviceSpace, HostSpace, MemorySpace};
pub use store::{InvariantViolation, ParticleStore};
pub use view::{FieldView, SlotMut};
