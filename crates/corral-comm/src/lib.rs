//! Process-group communication for Corral.
//!
//! The migration protocol talks to other processes only through the
//! [`Transport`] trait: non-blocking send/receive with tags, a joint
//! wait, and a few collectives built on top of those primitives. A
//! [`Distributor`] narrows a migration to a declared neighbour set.
//!
//! [`LocalGroup`] is an in-process transport where each "process" is a
//! thread holding one [`LocalTransport`] endpoint. It backs the test
//! suite and single-node runs; an MPI-backed transport implements the
//! same trait outside this workspace.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod distributor;
pub mod local;
pub mod transport;

pub use distributor::Distributor;
pub use local::{LocalGroup, LocalGroupConfig, LocalTransport};
pub use transport::{tags, RecvRequest, SendRequest, Tag, Transport};
