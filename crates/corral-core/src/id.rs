//! Strongly-typed identifiers shared across the workspace.

use std::fmt;

/// Element index reported for slots that belong to no element (spare
/// headroom blocks, trailing padding of row and flat layouts).
pub const NO_ELEMENT: usize = usize::MAX;

/// Identifies a process within a fixed process group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rank(pub usize);

impl Rank {
    /// The index of this rank as a `usize`.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for Rank {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

/// Process-independent global identifier of a mesh element.
///
/// Local element indices differ between processes; the global id is what
/// travels with a migrating particle and is resolved on arrival.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementGid(pub u64);

impl fmt::Display for ElementGid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ElementGid {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Stable particle identity, preserved by rebuild and migrate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticleId(pub u64);

impl fmt::Display for ParticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ParticleId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Position of a field in a [`Schema`](crate::Schema).
///
/// `FieldKey(0)` is always the reserved particle-id field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey(pub u32);

impl FieldKey {
    /// Key of the reserved `pid` field.
    pub const PID: FieldKey = FieldKey(0);

    /// The key as a column index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for FieldKey {
    fn from(v: u32) -> Self {
        Self(v)
    }
}
