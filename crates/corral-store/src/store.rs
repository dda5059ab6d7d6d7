//! The generic particle container: construction, accessors, and
//! invariant checks. Structural operations live in their own modules.

use std::fmt;
use std::marker::PhantomData;

use indexmap::IndexMap;

use corral_core::{ContainerError, ElementGid, ParticleId, Rank, Schema, NO_ELEMENT};

use crate::batch::ParticleSnapshot;
use crate::chunk::Chunk;
use crate::config::StoreConfig;
use crate::layout::{capacity_for, Layout, PlanParams};
use crate::space::{DeviceSpace, MemorySpace};

/// A broken container invariant found by
/// [`ParticleStore::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantViolation {
    /// What is inconsistent.
    pub reason: String,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container invariant violated: {}", self.reason)
    }
}

impl std::error::Error for InvariantViolation {}

/// Particles grouped by element in fixed-width blocks.
///
/// `L` decides how blocks are assigned to elements and `S` which memory
/// space the storage belongs to. All structural operations take `&mut
/// self`, so field views and in-flight iterations can never observe a
/// rebuild or migrate halfway through.
pub struct ParticleStore<L: Layout, S: MemorySpace = DeviceSpace> {
    pub(crate) config: StoreConfig,
    pub(crate) schema: Schema,
    pub(crate) element_gids: Vec<ElementGid>,
    pub(crate) gid_index: IndexMap<ElementGid, usize>,
    pub(crate) counts: Vec<usize>,
    pub(crate) chunks: Vec<Chunk>,
    /// Retired storage reused by the next same-capacity rebuild.
    pub(crate) staging: Vec<Chunk>,
    pub(crate) num_ptcls: usize,
    pub(crate) generation: u64,
    pub(crate) _marker: PhantomData<fn() -> (L, S)>,
}

impl<L: Layout, S: MemorySpace> fmt::Debug for ParticleStore<L, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleStore")
            .field("name", &self.config.name)
            .field("layout", &L::NAME)
            .field("space", &S::NAME)
            .field("rank", &self.config.rank)
            .field("num_elems", &self.num_elems())
            .field("num_ptcls", &self.num_ptcls)
            .field("capacity", &self.capacity())
            .field("generation", &self.generation)
            .finish()
    }
}

impl<L: Layout, S: MemorySpace> ParticleStore<L, S> {
    /// Build a container from an initial snapshot.
    ///
    /// Storage holds the required blocks plus `extra_padding` headroom
    /// (at least one spare block, so an empty snapshot still has
    /// capacity).
    pub fn from_snapshot(
        config: StoreConfig,
        snapshot: ParticleSnapshot,
    ) -> Result<Self, ContainerError> {
        config.validate()?;
        snapshot.validate()?;

        let ParticleSnapshot {
            element_gids,
            particles_per_element,
            particles,
        } = snapshot;
        let gid_index = element_gids
            .iter()
            .enumerate()
            .map(|(i, &gid)| (gid, i))
            .collect();
        let num_elems = element_gids.len();
        let params = PlanParams::from_config(&config, num_elems);
        let required = L::required_blocks(&particles_per_element, &params);
        let blocks = capacity_for(required, config.extra_padding);

        let mut store = Self {
            schema: particles.schema().clone(),
            config,
            element_gids,
            gid_index,
            counts: vec![0; num_elems],
            chunks: Vec::new(),
            staging: Vec::new(),
            num_ptcls: 0,
            generation: 0,
            _marker: PhantomData,
        };
        store.place("construct", &[], &particles, Some(blocks))?;
        tracing::debug!(
            name = %store.config.name,
            rank = store.config.rank.index(),
            layout = L::NAME,
            space = S::NAME,
            num_elems,
            num_ptcls = store.num_ptcls,
            capacity = store.capacity(),
            "container constructed"
        );
        Ok(store)
    }

    /// Container name from the config.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Rank of the owning process.
    pub fn rank(&self) -> Rank {
        self.config.rank
    }

    /// The active configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The per-particle field schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of local elements.
    pub fn num_elems(&self) -> usize {
        self.element_gids.len()
    }

    /// Number of active particles.
    pub fn num_ptcls(&self) -> usize {
        self.num_ptcls
    }

    /// Total slots, active or not.
    pub fn capacity(&self) -> usize {
        self.chunks.len() * self.config.block_width
    }

    /// Number of allocated blocks.
    pub fn num_blocks(&self) -> usize {
        self.chunks.len()
    }

    /// Slots per block.
    pub fn block_width(&self) -> usize {
        self.config.block_width
    }

    /// Number of representable element rows.
    pub fn num_rows(&self) -> usize {
        self.counts.len()
    }

    /// Global id of every local element.
    pub fn element_gids(&self) -> &[ElementGid] {
        &self.element_gids
    }

    /// Local index of the element with global id `gid`.
    pub fn element_of_gid(&self, gid: ElementGid) -> Option<usize> {
        self.gid_index.get(&gid).copied()
    }

    /// Active particle count of every element.
    pub fn particles_per_element(&self) -> &[usize] {
        &self.counts
    }

    /// Incremented by every structural change. Views taken at different
    /// generations never refer to the same slot layout.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `slot` holds a particle.
    pub fn is_active(&self, slot: usize) -> bool {
        let w = self.config.block_width;
        self.chunks
            .get(slot / w)
            .is_some_and(|c| c.active[slot % w])
    }

    /// Element of the particle in `slot`, or `None` for an inactive slot.
    pub fn element_at(&self, slot: usize) -> Option<usize> {
        let w = self.config.block_width;
        let chunk = self.chunks.get(slot / w)?;
        chunk.active[slot % w].then(|| chunk.parents[slot % w] as usize)
    }

    /// Identity of the particle in `slot`, or `None` for an inactive slot.
    pub fn pid_at(&self, slot: usize) -> Option<ParticleId> {
        self.is_active(slot)
            .then(|| ParticleId(self.get(self.schema.pid()).get(slot)))
    }

    /// Element a block is tied to. `None` for spare blocks and for
    /// layouts whose blocks mix elements.
    pub fn block_element(&self, block: usize) -> Option<usize> {
        self.chunks.get(block)?.element.map(|e| e as usize)
    }

    /// Element reported for a slot by parallel iteration.
    pub(crate) fn slot_element(chunk: &Chunk, lane: usize) -> usize {
        if chunk.active[lane] {
            chunk.parents[lane] as usize
        } else {
            chunk.element.map_or(NO_ELEMENT, |e| e as usize)
        }
    }

    /// Check every container invariant.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        let fail = |reason: String| Err(InvariantViolation { reason });
        let w = self.config.block_width;
        let n = self.num_elems();

        if self.counts.len() != n || self.gid_index.len() != n {
            return fail(format!(
                "element tables disagree: {} gids, {} counts, {} indexed",
                n,
                self.counts.len(),
                self.gid_index.len()
            ));
        }
        let declared: usize = self.counts.iter().sum();
        if declared != self.num_ptcls {
            return fail(format!(
                "per-element counts sum to {declared}, total is {}",
                self.num_ptcls
            ));
        }
        if self.capacity() < self.num_ptcls {
            return fail(format!(
                "capacity {} below particle count {}",
                self.capacity(),
                self.num_ptcls
            ));
        }

        let mut found = vec![0usize; n];
        for (b, chunk) in self.chunks.iter().enumerate() {
            if chunk.width() != w || chunk.columns.len() != self.schema.len() {
                return fail(format!("block {b} has the wrong shape"));
            }
            for (col, def) in chunk.columns.iter().zip(self.schema.fields()) {
                if col.kind() != def.kind || col.len() != w * def.components as usize {
                    return fail(format!("block {b} column '{}' has the wrong shape", def.name));
                }
            }
            for lane in 0..w {
                if !chunk.active[lane] {
                    continue;
                }
                let parent = chunk.parents[lane] as usize;
                if parent >= n {
                    return fail(format!("slot {} has parent {parent} out of range", b * w + lane));
                }
                if let Some(e) = chunk.element {
                    if e as usize != parent {
                        return fail(format!(
                            "slot {} has parent {parent} but block {b} belongs to element {e}",
                            b * w + lane
                        ));
                    }
                }
                found[parent] += 1;
            }
        }
        if let Some(e) = (0..n).find(|&e| found[e] != self.counts[e]) {
            return fail(format!(
                "element {e} counts {} but holds {} active slots",
                self.counts[e], found[e]
            ));
        }
        Ok(())
    }

    /// Release all storage now instead of at end of scope.
    pub fn release(self) {
        tracing::debug!(
            name = %self.config.name,
            rank = self.config.rank.index(),
            capacity = self.capacity(),
            "container released"
        );
    }
}
