//! Error taxonomy for container construction, structural mutation, and
//! inter-process communication.
//!
//! Construction and local rebuild errors are recoverable by retrying with
//! corrected input. Anything raised by migrate is not locally
//! recoverable: the caller must abort the distributed job.

use std::error::Error;
use std::fmt;

use crate::id::{ElementGid, Rank};
use crate::schema::SchemaError;

/// A malformed construction snapshot or configuration.
///
/// Raised before any container exists.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstructionError {
    /// A configuration value is out of range.
    InvalidConfig {
        /// Description of the violated constraint.
        reason: String,
    },
    /// The field schema is invalid.
    Schema(SchemaError),
    /// Two snapshot arrays that must agree in length do not.
    LengthMismatch {
        /// Which array is wrong.
        what: &'static str,
        /// Required length.
        expected: usize,
        /// Supplied length.
        found: usize,
    },
    /// A particle is assigned to an element outside `0..num_elems`.
    ElementOutOfRange {
        /// Index of the particle in the snapshot.
        particle: usize,
        /// The invalid element index.
        element: usize,
        /// Number of declared elements.
        num_elems: usize,
    },
    /// Declared per-element count disagrees with the particle map.
    CountMismatch {
        /// The element whose count is wrong.
        element: usize,
        /// Count from `particles_per_element`.
        declared: usize,
        /// Count derived from particle assignments.
        found: usize,
    },
    /// Two elements share a global id.
    DuplicateElementGid {
        /// The repeated gid.
        gid: ElementGid,
    },
}

impl fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { reason } => write!(f, "invalid config: {reason}"),
            Self::Schema(e) => write!(f, "invalid schema: {e}"),
            Self::LengthMismatch {
                what,
                expected,
                found,
            } => write!(f, "{what} has length {found}, expected {expected}"),
            Self::ElementOutOfRange {
                particle,
                element,
                num_elems,
            } => write!(
                f,
                "particle {particle} assigned to element {element}, but only {num_elems} elements exist"
            ),
            Self::CountMismatch {
                element,
                declared,
                found,
            } => write!(
                f,
                "element {element} declares {declared} particles but {found} are assigned to it"
            ),
            Self::DuplicateElementGid { gid } => write!(f, "duplicate element gid {gid}"),
        }
    }
}

impl Error for ConstructionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Schema(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SchemaError> for ConstructionError {
    fn from(e: SchemaError) -> Self {
        Self::Schema(e)
    }
}

/// Transport-level failure.
///
/// Fatal for the whole collective: peers may be left blocked, and the
/// only safe reaction is aborting the distributed job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommError {
    /// The peer's endpoint has been dropped.
    Disconnected {
        /// The unreachable peer.
        peer: Rank,
    },
    /// No matching message arrived within the transport's timeout.
    Timeout {
        /// The peer that was expected to send.
        peer: Rank,
        /// The message tag that was awaited.
        tag: u32,
    },
    /// A message had an unexpected size.
    Truncated {
        /// The sending peer.
        peer: Rank,
        /// Expected byte count.
        expected: usize,
        /// Received byte count.
        found: usize,
    },
    /// A rank outside the declared peer set was addressed.
    NotAPeer {
        /// The rank that is not a peer.
        rank: Rank,
    },
    /// A rank outside `0..size` was addressed.
    RankOutOfRange {
        /// The invalid rank.
        rank: Rank,
        /// Size of the process group.
        size: usize,
    },
    /// A transport endpoint was used on behalf of another rank.
    WrongEndpoint {
        /// Rank the caller acts for.
        expected: Rank,
        /// Rank the endpoint belongs to.
        found: Rank,
    },
    /// A distributor declaration is malformed.
    InvalidDistributor {
        /// Description of the problem.
        reason: String,
    },
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected { peer } => write!(f, "peer {peer} disconnected"),
            Self::Timeout { peer, tag } => {
                write!(f, "timed out waiting for tag {tag} from peer {peer}")
            }
            Self::Truncated {
                peer,
                expected,
                found,
            } => write!(
                f,
                "message from peer {peer} has {found} bytes, expected {expected}"
            ),
            Self::NotAPeer { rank } => write!(f, "rank {rank} is not a declared peer"),
            Self::RankOutOfRange { rank, size } => {
                write!(f, "rank {rank} outside process group of size {size}")
            }
            Self::WrongEndpoint { expected, found } => {
                write!(f, "endpoint of rank {found} used by rank {expected}")
            }
            Self::InvalidDistributor { reason } => write!(f, "invalid distributor: {reason}"),
        }
    }
}

impl Error for CommError {}

/// Errors from container operations.
///
/// Every variant names the operation and the process rank so a failure
/// in a multi-process job can be attributed from any log line.
#[derive(Clone, Debug, PartialEq)]
pub enum ContainerError {
    /// Snapshot or configuration was malformed.
    Construction(ConstructionError),
    /// A saved state handed to an operation is inconsistent.
    InvalidState {
        /// Operation that received the state.
        op: &'static str,
        /// Rank of the failing process.
        rank: Rank,
        /// What is wrong with it.
        source: ConstructionError,
    },
    /// Storage growth failed. Fatal: no safe continuation.
    Capacity {
        /// Operation that needed the storage.
        op: &'static str,
        /// Rank of the failing process.
        rank: Rank,
        /// Slot capacity that was requested.
        requested_slots: usize,
        /// Why growth failed.
        reason: String,
    },
    /// A supplied element or process target is out of range.
    InvalidTarget {
        /// Operation that received the mapping.
        op: &'static str,
        /// Rank of the failing process.
        rank: Rank,
        /// The slot whose target is invalid.
        slot: usize,
        /// What is wrong with it.
        reason: String,
    },
    /// The API was used against its contract.
    Usage {
        /// Operation that was misused.
        op: &'static str,
        /// Rank of the failing process.
        rank: Rank,
        /// The violated precondition.
        reason: String,
    },
    /// Transport failure inside a collective phase.
    Communication {
        /// Operation that was communicating.
        op: &'static str,
        /// Rank of the failing process.
        rank: Rank,
        /// The transport error.
        source: CommError,
    },
    /// A migrated particle names an element gid unknown on this rank.
    UnknownElementGid {
        /// Operation that resolved the gid.
        op: &'static str,
        /// Rank of the receiving process.
        rank: Rank,
        /// The unresolvable gid.
        gid: ElementGid,
    },
    /// Another rank rejected its input to a collective, so this rank
    /// stopped before sending anything. Its storage is unchanged.
    PeerRejected {
        /// The collective operation.
        op: &'static str,
        /// Rank of the reporting process.
        rank: Rank,
        /// How many ranks rejected their input.
        failed_ranks: usize,
    },
    /// The external checkpoint store failed.
    Checkpoint {
        /// Checkpoint operation.
        op: &'static str,
        /// Rank of the failing process.
        rank: Rank,
        /// Store-provided description.
        reason: String,
    },
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Construction(e) => write!(f, "construction failed: {e}"),
            Self::InvalidState { op, rank, source } => {
                write!(f, "{op} on rank {rank}: invalid state: {source}")
            }
            Self::Capacity {
                op,
                rank,
                requested_slots,
                reason,
            } => write!(
                f,
                "{op} on rank {rank}: cannot grow to {requested_slots} slots: {reason}"
            ),
            Self::InvalidTarget {
                op,
                rank,
                slot,
                reason,
            } => write!(f, "{op} on rank {rank}: slot {slot}: {reason}"),
            Self::Usage { op, rank, reason } => write!(f, "{op} on rank {rank}: {reason}"),
            Self::Communication { op, rank, source } => {
                write!(f, "{op} on rank {rank}: communication failed: {source}")
            }
            Self::UnknownElementGid { op, rank, gid } => write!(
                f,
                "{op} on rank {rank}: element gid {gid} does not exist on this rank"
            ),
            Self::PeerRejected {
                op,
                rank,
                failed_ranks,
            } => write!(
                f,
                "{op} on rank {rank}: aborted because {failed_ranks} rank(s) rejected their input"
            ),
            Self::Checkpoint { op, rank, reason } => {
                write!(f, "{op} on rank {rank}: checkpoint store failed: {reason}")
            }
        }
    }
}

impl Error for ContainerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Construction(e) | Self::InvalidState { source: e, .. } => Some(e),
            Self::Communication { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConstructionError> for ContainerError {
    fn from(e: ConstructionError) -> Self {
        Self::Construction(e)
    }
}

impl ContainerError {
    /// Whether the error came out of a collective phase and therefore
    /// requires aborting the whole job.
    ///
    /// Every error raised by migrate counts, including input errors:
    /// those are agreed on by all ranks before any exchange, so each
    /// rank reports the same classification.
    pub fn is_collective_fatal(&self) -> bool {
        match self {
            Self::Communication { .. }
            | Self::UnknownElementGid { .. }
            | Self::Capacity { .. }
            | Self::PeerRejected { .. } => true,
            Self::Usage { op, .. } | Self::InvalidTarget { op, .. } => *op == "migrate",
            Self::Construction(_) | Self::InvalidState { .. } | Self::Checkpoint { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_operation_and_rank() {
        let e = ContainerError::Communication {
            op: "migrate",
            rank: Rank(3),
            source: CommError::Disconnected { peer: Rank(1) },
        };
        let text = e.to_string();
        assert!(text.contains("migrate"));
        assert!(text.contains("rank 3"));
        assert!(text.contains("peer 1"));
        assert!(e.source().is_some());
        assert!(e.is_collective_fatal());
    }

    #[test]
    fn migrate_input_errors_match_peer_classification() {
        let peer = ContainerError::PeerRejected {
            op: "migrate",
            rank: Rank(2),
            failed_ranks: 1,
        };
        let local = ContainerError::InvalidTarget {
            op: "migrate",
            rank: Rank(0),
            slot: 4,
            reason: "destination rank 2 is not a peer".into(),
        };
        assert!(peer.is_collective_fatal());
        assert!(local.is_collective_fatal());
        assert!(peer.to_string().contains("rank 2"));

        let rebuild = ContainerError::InvalidTarget {
            op: "rebuild",
            rank: Rank(0),
            slot: 4,
            reason: "element 9 out of range".into(),
        };
        assert!(!rebuild.is_collective_fatal());
    }

    #[test]
    fn construction_errors_are_recoverable() {
        let e: ContainerError = ConstructionError::DuplicateElementGid {
            gid: ElementGid(7),
        }
        .into();
        assert!(!e.is_collective_fatal());
        assert!(e.to_string().contains("gid 7"));
    }
}
