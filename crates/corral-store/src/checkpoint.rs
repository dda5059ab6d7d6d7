//! Checkpoint boundary.
//!
//! Persistent encoding belongs to an external [`CheckpointStore`]. The
//! container only produces and consumes [`CheckpointState`] values, and
//! the collective wrappers make sure the store is touched by the leader
//! rank alone while the whole group stays in step.

use std::fmt;
use std::time::Instant;

use corral_comm::Transport;
use corral_core::{ConstructionError, ContainerError, ElementGid, Rank, Timings};

use crate::batch::{ParticleBatch, ParticleSnapshot};
use crate::layout::Layout;
use crate::space::MemorySpace;
use crate::store::ParticleStore;

/// Rank that talks to the checkpoint store.
pub const LEADER: Rank = Rank(0);

/// Everything needed to repopulate a container.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckpointState {
    /// Container name.
    pub name: String,
    /// Number of elements.
    pub num_elems: usize,
    /// Number of particles.
    pub num_ptcls: usize,
    /// Headroom fraction in effect when the state was taken.
    pub extra_padding: f64,
    /// Global id of every element.
    pub element_gids: Vec<ElementGid>,
    /// Particle count of every element.
    pub particles_per_element: Vec<usize>,
    /// Every active particle with its element.
    pub particles: ParticleBatch,
}

/// External persistence for checkpoint states.
pub trait CheckpointStore {
    /// Store-specific failure.
    type Error: fmt::Display;

    /// Persist `state` under `state.name`.
    fn write(&mut self, state: &CheckpointState) -> Result<(), Self::Error>;

    /// Load the state saved under `name`.
    fn read(&mut self, name: &str) -> Result<CheckpointState, Self::Error>;
}

impl<L: Layout, S: MemorySpace> ParticleStore<L, S> {
    /// Snapshot of the container's state. Particles appear in slot order.
    pub fn checkpoint_state(&self) -> CheckpointState {
        let w = self.config.block_width;
        let mut particles = ParticleBatch::with_capacity(self.schema.clone(), self.num_ptcls);
        for chunk in &self.chunks {
            for lane in 0..w {
                if chunk.active[lane] {
                    particles.push_lane(chunk.parents[lane] as usize, &chunk.columns, lane);
                }
            }
        }
        CheckpointState {
            name: self.config.name.clone(),
            num_elems: self.num_elems(),
            num_ptcls: self.num_ptcls,
            extra_padding: self.config.extra_padding,
            element_gids: self.element_gids.clone(),
            particles_per_element: self.counts.clone(),
            particles,
        }
    }

    /// Replace the whole container content with `state`.
    ///
    /// The state is fully validated first; on error the container is
    /// unchanged.
    pub fn restore(&mut self, state: CheckpointState) -> Result<(), ContainerError> {
        const OP: &str = "restore";
        let rank = self.config.rank;
        let invalid = |source: ConstructionError| ContainerError::InvalidState {
            op: OP,
            rank,
            source,
        };
        if !state.particles.schema().same_layout(&self.schema) {
            return Err(ContainerError::Usage {
                op: OP,
                rank,
                reason: "checkpoint uses a different field schema".into(),
            });
        }
        if state.num_elems != state.element_gids.len() {
            return Err(invalid(ConstructionError::LengthMismatch {
                what: "element_gids",
                expected: state.num_elems,
                found: state.element_gids.len(),
            }));
        }
        if state.num_ptcls != state.particles.len() {
            return Err(invalid(ConstructionError::LengthMismatch {
                what: "particles",
                expected: state.num_ptcls,
                found: state.particles.len(),
            }));
        }

        let mut config = self.config.clone();
        config.name = state.name;
        config.extra_padding = state.extra_padding;
        let snapshot = ParticleSnapshot {
            element_gids: state.element_gids,
            particles_per_element: state.particles_per_element,
            particles: state.particles,
        };
        let mut restored = Self::from_snapshot(config, snapshot).map_err(|e| match e {
            ContainerError::Construction(source) => invalid(source),
            other => other,
        })?;
        restored.generation = self.generation + 1;
        *self = restored;
        Ok(())
    }

    /// Collective write: the leader hands its state to `store`, every
    /// rank joins a barrier.
    pub fn checkpoint_write<C, T>(
        &self,
        store: &mut C,
        transport: &T,
        timings: &mut Timings,
    ) -> Result<(), ContainerError>
    where
        C: CheckpointStore,
        T: Transport + ?Sized,
    {
        const OP: &str = "checkpoint_write";
        let prebarrier = self.prebarrier(OP, transport)?;
        let start = Instant::now();
        let written = if transport.rank() == LEADER {
            store.write(&self.checkpoint_state()).map_err(|e| ContainerError::Checkpoint {
                op: OP,
                rank: self.config.rank,
                reason: e.to_string(),
            })
        } else {
            Ok(())
        };
        self.join(OP, transport)?;
        written?;
        timings.record(OP, start.elapsed(), prebarrier);
        Ok(())
    }

    /// Collective read: the leader loads `self.name()` from `store` and
    /// restores it, every rank joins a barrier. Other ranks keep their
    /// content.
    pub fn checkpoint_read<C, T>(
        &mut self,
        store: &mut C,
        transport: &T,
        timings: &mut Timings,
    ) -> Result<(), ContainerError>
    where
        C: CheckpointStore,
        T: Transport + ?Sized,
    {
        const OP: &str = "checkpoint_read";
        let prebarrier = self.prebarrier(OP, transport)?;
        let start = Instant::now();
        let restored = if transport.rank() == LEADER {
            let rank = self.config.rank;
            store
                .read(&self.config.name)
                .map_err(|e| ContainerError::Checkpoint {
                    op: OP,
                    rank,
                    reason: e.to_string(),
                })
                .and_then(|state| self.restore(state))
        } else {
            Ok(())
        };
        self.join(OP, transport)?;
        restored?;
        timings.record(OP, start.elapsed(), prebarrier);
        Ok(())
    }

    fn join<T: Transport + ?Sized>(&self, op: &'static str, transport: &T) -> Result<(), ContainerError> {
        transport
            .barrier()
            .map_err(|source| ContainerError::Communication {
                op,
                rank: self.config.rank,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::BlockContainer;
    use crate::testing::{sample_snapshot, small_config};

    #[test]
    fn state_lists_every_particle_once() {
        let s = <BlockContainer>::from_snapshot(small_config(), sample_snapshot()).unwrap();
        let state = s.checkpoint_state();
        assert_eq!(state.num_ptcls, s.num_ptcls());
        assert_eq!(state.particles.len(), s.num_ptcls());
        let mut pids: Vec<u64> = (0..state.particles.len())
            .map(|i| state.particles.pid(i).0)
            .collect();
        pids.sort_unstable();
        assert_eq!(pids, (0..s.num_ptcls() as u64).collect::<Vec<_>>());
    }

    #[test]
    fn restore_round_trips_state() {
        let a = <BlockContainer>::from_snapshot(small_config(), sample_snapshot()).unwrap();
        let empty = ParticleSnapshot::empty(a.schema().clone(), vec![ElementGid(1)]);
        let mut b = <BlockContainer>::from_snapshot(small_config(), empty).unwrap();
        b.restore(a.checkpoint_state()).unwrap();
        assert_eq!(b.num_ptcls(), a.num_ptcls());
        assert_eq!(b.element_gids(), a.element_gids());
        assert_eq!(b.particles_per_element(), a.particles_per_element());
        assert_eq!(b.generation(), 1);
        b.validate().unwrap();
    }

    #[test]
    fn inconsistent_state_leaves_container_unchanged() {
        let a = <BlockContainer>::from_snapshot(small_config(), sample_snapshot()).unwrap();
        let mut b = <BlockContainer>::from_snapshot(small_config(), sample_snapshot()).unwrap();
        let mut state = a.checkpoint_state();
        state.num_ptcls += 1;
        let err = b.restore(state).unwrap_err();
        assert!(matches!(
            err,
            ContainerError::InvalidState {
                op: "restore",
                rank: Rank(0),
                source: ConstructionError::LengthMismatch { what: "particles", .. },
            }
        ));
        assert!(err.to_string().contains("restore on rank 0"));
        assert_eq!(b.num_ptcls(), a.num_ptcls());
        assert_eq!(b.generation(), 0);
    }
}
