//! Deep copies between memory spaces.

use std::marker::PhantomData;

use crate::layout::Layout;
use crate::space::MemorySpace;
use crate::store::ParticleStore;

impl<L: Layout, S: MemorySpace> ParticleStore<L, S> {
    /// A structurally identical copy tagged with memory space `S2`.
    ///
    /// Element count, particle count, capacity, element gids, block
    /// assignment and every slot's values are preserved. The copy shares
    /// nothing with `self`; mutating either side never affects the
    /// other.
    pub fn mirror<S2: MemorySpace>(&self) -> ParticleStore<L, S2> {
        tracing::debug!(
            name = %self.config.name,
            rank = self.config.rank.index(),
            from = S::NAME,
            to = S2::NAME,
            capacity = self.capacity(),
            "mirroring container"
        );
        ParticleStore {
            config: self.config.clone(),
            schema: self.schema.clone(),
            element_gids: self.element_gids.clone(),
            gid_index: self.gid_index.clone(),
            counts: self.counts.clone(),
            chunks: self.chunks.clone(),
            staging: Vec::new(),
            num_ptcls: self.num_ptcls,
            generation: self.generation,
            _marker: PhantomData,
        }
    }
}
