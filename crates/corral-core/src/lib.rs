//! Core types for the Corral particle containers.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the identifiers, the per-particle field schema and column storage,
//! the error taxonomy, and the explicit timing collector shared by every
//! other crate.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod schema;
pub mod timing;

pub use error::{CommError, ConstructionError, ContainerError};
pub use id::{ElementGid, FieldKey, ParticleId, Rank, NO_ELEMENT};
pub use schema::{Column, Field, FieldDef, FieldKind, FieldType, Schema, SchemaError, PID_FIELD};
pub use timing::{TimingEntry, Timings};
