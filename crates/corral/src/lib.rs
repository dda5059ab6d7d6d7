//! Corral: element-partitioned particle containers.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the Corral sub-crates. For most users, adding `corral` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use corral::prelude::*;
//!
//! let schema = Schema::new(vec![FieldDef::scalar("weight", FieldKind::F64)]).unwrap();
//! let weight = schema.field::<f64>("weight").unwrap();
//!
//! // Three particles over three mesh elements.
//! let mut batch = ParticleBatch::new(schema);
//! for (element, pid) in [(0, 10), (0, 11), (2, 12)] {
//!     let i = batch.push(element, ParticleId(pid));
//!     batch.set(i, weight, &[1.0]);
//! }
//! let gids = vec![ElementGid(7), ElementGid(8), ElementGid(9)];
//! let snapshot = ParticleSnapshot::from_batch(gids, batch);
//! let mut c = <BlockContainer>::from_snapshot(StoreConfig::default(), snapshot).unwrap();
//! assert_eq!(c.particles_per_element(), &[2, 0, 1]);
//!
//! // Move every particle into element 1.
//! let mapping: Vec<Option<usize>> =
//!     (0..c.capacity()).map(|slot| c.is_active(slot).then_some(1)).collect();
//! let mut timings = Timings::new();
//! c.rebuild(&mapping, &mut timings).unwrap();
//! assert_eq!(c.particles_per_element(), &[0, 3, 0]);
//! assert_eq!(timings.get("rebuild").unwrap().calls, 1);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `corral-core` | Ids, field schema, errors, timings |
//! | [`comm`] | `corral-comm` | `Transport` trait, in-process group, distributor |
//! | [`store`] | `corral-store` | Containers, layouts, rebuild, migrate, mirror |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Ids, field schema, error taxonomy, and timing collector (`corral-core`).
pub use corral_core as types;

/// Point-to-point transport and peer sets (`corral-comm`).
///
/// Implement [`comm::Transport`] over a real message-passing layer, or use
/// [`comm::LocalGroup`] to run several ranks as threads of one process.
pub use corral_comm as comm;

/// Particle containers and their structural operations (`corral-store`).
///
/// [`store::BlockContainer`], [`store::CsrContainer`],
/// [`store::FlatContainer`], and [`store::TeamContainer`] share the
/// [`store::ParticleContainer`] contract.
pub use corral_store as store;

/// Common imports for typical Corral usage.
///
/// ```rust
/// use corral::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use corral_core::{
        ElementGid, Field, FieldDef, FieldKind, ParticleId, Rank, Schema, Timings,
    };

    // Errors
    pub use corral_core::{CommError, ConstructionError, ContainerError};

    // Transport
    pub use corral_comm::{Distributor, LocalGroup, Transport};

    // Containers
    pub use corral_store::{
        BlockContainer, CheckpointStore, CsrContainer, DeviceSpace, FlatContainer, HostSpace,
        ParticleBatch, ParticleContainer, ParticleSnapshot, StoreConfig, TeamContainer,
    };
}
