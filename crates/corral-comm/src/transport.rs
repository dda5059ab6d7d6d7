//! The point-to-point transport capability used by migration.

use corral_core::{CommError, Rank};

/// Message channel discriminator. Messages match on `(source, tag)`.
pub type Tag = u32;

/// Tags reserved by the workspace's collectives and protocols.
pub mod tags {
    use super::Tag;

    /// Per-peer particle counts in migrate.
    pub const MIGRATE_COUNTS: Tag = 0x4d43;
    /// Packed particle records in migrate.
    pub const MIGRATE_PAYLOAD: Tag = 0x4d50;
    /// Contributions flowing to rank 0 in a reduction.
    pub const REDUCE: Tag = 0x5244;
    /// Result flowing back from rank 0 after a reduction.
    pub const BROADCAST: Tag = 0x4243;
}

/// Handle for an issued send. Completed by [`Transport::wait_all`].
#[must_use = "sends complete only through Transport::wait_all"]
#[derive(Debug)]
pub struct SendRequest {
    dest: Rank,
    tag: Tag,
    bytes: usize,
}

impl SendRequest {
    /// Create a request record. Transports call this from `isend`.
    pub fn new(dest: Rank, tag: Tag, bytes: usize) -> Self {
        Self { dest, tag, bytes }
    }

    /// Destination rank.
    pub fn dest(&self) -> Rank {
        self.dest
    }

    /// Message tag.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Payload size.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

/// Handle for a posted receive. Completed by [`Transport::wait_all`].
#[must_use = "receives complete only through Transport::wait_all"]
#[derive(Debug)]
pub struct RecvRequest {
    source: Rank,
    tag: Tag,
}

impl RecvRequest {
    /// Create a request record. Transports call this from `irecv`.
    pub fn new(source: Rank, tag: Tag) -> Self {
        Self { source, tag }
    }

    /// Expected sender.
    pub fn source(&self) -> Rank {
        self.source
    }

    /// Expected tag.
    pub fn tag(&self) -> Tag {
        self.tag
    }
}

/// Point-to-point message passing within a fixed process group.
///
/// Implementations must deliver messages between one `(source, dest,
/// tag)` triple in send order. Ordering across different peers or tags
/// is unspecified. All errors are fatal for the enclosing collective.
pub trait Transport: Send + Sync {
    /// This process's rank.
    fn rank(&self) -> Rank;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Start sending `payload` to `dest`.
    fn isend(&self, dest: Rank, tag: Tag, payload: Vec<u8>) -> Result<SendRequest, CommError>;

    /// Post a receive for the next message from `source` with `tag`.
    fn irecv(&self, source: Rank, tag: Tag) -> Result<RecvRequest, CommError>;

    /// Block until every request has completed. Returns received
    /// payloads in the order of `recvs`.
    fn wait_all(
        &self,
        sends: Vec<SendRequest>,
        recvs: Vec<RecvRequest>,
    ) -> Result<Vec<Vec<u8>>, CommError>;

    /// Check that `rank` is addressable in this group.
    fn check_rank(&self, rank: Rank) -> Result<(), CommError> {
        if rank.index() < self.size() {
            Ok(())
        } else {
            Err(CommError::RankOutOfRange {
                rank,
                size: self.size(),
            })
        }
    }

    /// Exchange one count with every peer.
    ///
    /// `send_counts[i]` goes to `peers[i]`; the returned `recv[i]` came
    /// from `peers[i]`. The entry for this rank is copied locally. Every
    /// listed peer must list this rank in its own call.
    fn exchange_counts(
        &self,
        peers: &[Rank],
        send_counts: &[u64],
        tag: Tag,
    ) -> Result<Vec<u64>, CommError> {
        let me = self.rank();
        let mut sends = Vec::with_capacity(peers.len());
        let mut recvs = Vec::with_capacity(peers.len());
        for (&peer, &count) in peers.iter().zip(send_counts) {
            if peer == me {
                continue;
            }
            self.check_rank(peer)?;
            recvs.push(self.irecv(peer, tag)?);
            sends.push(self.isend(peer, tag, count.to_le_bytes().to_vec())?);
        }
        let payloads = self.wait_all(sends, recvs)?;

        let mut received = payloads.into_iter();
        let mut out = Vec::with_capacity(peers.len());
        for (&peer, &count) in peers.iter().zip(send_counts) {
            if peer == me {
                out.push(count);
                continue;
            }
            let bytes = received.next().unwrap_or_default();
            let buf: [u8; 8] = bytes.as_slice().try_into().map_err(|_| CommError::Truncated {
                peer,
                expected: 8,
                found: bytes.len(),
            })?;
            out.push(u64::from_le_bytes(buf));
        }
        Ok(out)
    }

    /// Sum `value` over the whole group; every rank gets the result.
    fn all_reduce_sum(&self, value: u64) -> Result<u64, CommError> {
        let me = self.rank();
        let root = Rank(0);
        if me == root {
            let recvs = (1..self.size())
                .map(|r| self.irecv(Rank(r), tags::REDUCE))
                .collect::<Result<Vec<_>, _>>()?;
            let parts = self.wait_all(Vec::new(), recvs)?;
            let mut total = value;
            for (i, bytes) in parts.iter().enumerate() {
                let buf: [u8; 8] = bytes.as_slice().try_into().map_err(|_| CommError::Truncated {
                    peer: Rank(i + 1),
                    expected: 8,
                    found: bytes.len(),
                })?;
                total += u64::from_le_bytes(buf);
            }
            let sends = (1..self.size())
                .map(|r| self.isend(Rank(r), tags::BROADCAST, total.to_le_bytes().to_vec()))
                .collect::<Result<Vec<_>, _>>()?;
            self.wait_all(sends, Vec::new())?;
            Ok(total)
        } else {
            let send = self.isend(root, tags::REDUCE, value.to_le_bytes().to_vec())?;
            let recv = self.irecv(root, tags::BROADCAST)?;
            let mut got = self.wait_all(vec![send], vec![recv])?;
            let bytes = got.pop().unwrap_or_default();
            let buf: [u8; 8] = bytes.as_slice().try_into().map_err(|_| CommError::Truncated {
                peer: root,
                expected: 8,
                found: bytes.len(),
            })?;
            Ok(u64::from_le_bytes(buf))
        }
    }

    /// Block until every rank has entered the barrier.
    fn barrier(&self) -> Result<(), CommError> {
        self.all_reduce_sum(0).map(|_| ())
    }
}
