//! In-memory checkpoint store.

use std::fmt;

use indexmap::IndexMap;

use corral_store::{CheckpointState, CheckpointStore};

/// Failure of the in-memory store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryCheckpointError(pub String);

impl fmt::Display for MemoryCheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keeps written states in a map keyed by container name.
#[derive(Debug, Default)]
pub struct MemoryCheckpoint {
    states: IndexMap<String, CheckpointState>,
    /// Number of `write` calls.
    pub writes: usize,
    /// Number of `read` calls.
    pub reads: usize,
    /// Make every `write` fail.
    pub fail_writes: bool,
}

impl MemoryCheckpoint {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored state for `name`.
    pub fn state(&self, name: &str) -> Option<&CheckpointState> {
        self.states.get(name)
    }

    /// Insert a state directly.
    pub fn insert(&mut self, state: CheckpointState) {
        self.states.insert(state.name.clone(), state);
    }
}

impl CheckpointStore for MemoryCheckpoint {
    type Error = MemoryCheckpointError;

    fn write(&mut self, state: &CheckpointState) -> Result<(), Self::Error> {
        self.writes += 1;
        if self.fail_writes {
            return Err(MemoryCheckpointError("write rejected".into()));
        }
        self.insert(state.clone());
        Ok(())
    }

    fn read(&mut self, name: &str) -> Result<CheckpointState, Self::Error> {
        self.reads += 1;
        self.states
            .get(name)
            .cloned()
            .ok_or_else(|| MemoryCheckpointError(format!("no checkpoint named '{name}'")))
    }
}
