//! Declared communication neighbourhoods for migration.

use indexmap::IndexMap;

use corral_core::{CommError, Rank};

/// The set of ranks this process may exchange particles with.
///
/// The set always includes this process itself, is sorted, and carries
/// no duplicates. Migration only sends to and receives from listed
/// peers, so a destination outside the set is a usage error. Neighbour
/// lists must be symmetric across the group: if A lists B, B lists A.
/// That cannot be checked locally and a violation shows up as a
/// receive timeout.
#[derive(Clone, Debug)]
pub struct Distributor {
    me: Rank,
    peers: Vec<Rank>,
    slots: IndexMap<Rank, usize>,
}

impl Distributor {
    /// Build a distributor for `me` over `peers`.
    ///
    /// `peers` is sorted and deduplicated. It must contain `me`.
    pub fn new(me: Rank, peers: impl IntoIterator<Item = Rank>) -> Result<Self, CommError> {
        let mut peers: Vec<Rank> = peers.into_iter().collect();
        peers.sort_unstable();
        peers.dedup();
        if peers.binary_search(&me).is_err() {
            return Err(CommError::InvalidDistributor {
                reason: format!("peer list for rank {me} does not include itself"),
            });
        }
        let slots = peers.iter().enumerate().map(|(i, &r)| (r, i)).collect();
        Ok(Self { me, peers, slots })
    }

    /// Every rank in `0..size` is a peer.
    pub fn world(me: Rank, size: usize) -> Result<Self, CommError> {
        if me.index() >= size {
            return Err(CommError::RankOutOfRange { rank: me, size });
        }
        Self::new(me, (0..size).map(Rank))
    }

    /// The owning rank.
    pub fn me(&self) -> Rank {
        self.me
    }

    /// Peers in ascending order, including [`me`](Self::me).
    pub fn peers(&self) -> &[Rank] {
        &self.peers
    }

    /// Number of peers, including this process.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Always false; a distributor contains at least its owner.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Whether `rank` is a peer.
    pub fn contains(&self, rank: Rank) -> bool {
        self.slots.contains_key(&rank)
    }

    /// Position of `rank` in [`peers`](Self::peers).
    pub fn slot_of(&self, rank: Rank) -> Option<usize> {
        self.slots.get(&rank).copied()
    }

    /// Position of `rank`, or [`CommError::NotAPeer`].
    pub fn require(&self, rank: Rank) -> Result<usize, CommError> {
        self.slot_of(rank).ok_or(CommError::NotAPeer { rank })
    }

    /// Check every peer is addressable in a group of `size`.
    pub fn validate_against(&self, size: usize) -> Result<(), CommError> {
        match self.peers.last() {
            Some(&rank) if rank.index() >= size => Err(CommError::RankOutOfRange { rank, size }),
            _ => Ok(()),
        }
    }
}
