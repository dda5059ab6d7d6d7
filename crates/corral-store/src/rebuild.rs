//! Local reorganization: reassign, drop, and insert particles.
//!
//! The whole mapping is validated before storage is touched. Particles
//! are then gathered into a staging block array, which is swapped in
//! only once complete, so a failed rebuild leaves the container as it
//! was.

use std::time::{Duration, Instant};

use corral_core::{ContainerError, Timings};

use crate::batch::ParticleBatch;
use crate::chunk::{self, Chunk};
use crate::iterate::for_each_chunk_mut;
use crate::layout::{resize_target, Layout, PlanParams};
use crate::space::MemorySpace;
use crate::store::ParticleStore;

/// Where a placed particle comes from.
#[derive(Clone, Copy, Debug)]
enum Source {
    Retained(usize),
    Arrival(usize),
}

impl<L: Layout, S: MemorySpace> ParticleStore<L, S> {
    /// Move every active particle to `new_element[slot]`; `None`
    /// removes it. Entries for inactive slots are ignored.
    ///
    /// `new_element` must have one entry per slot
    /// ([`capacity`](Self::capacity)).
    pub fn rebuild(
        &mut self,
        new_element: &[Option<usize>],
        timings: &mut Timings,
    ) -> Result<(), ContainerError> {
        let schema = self.schema.clone();
        self.rebuild_with(new_element, ParticleBatch::new(schema), timings)
    }

    /// [`rebuild`](Self::rebuild) that also inserts `arrivals` into the
    /// elements they name.
    pub fn rebuild_with(
        &mut self,
        new_element: &[Option<usize>],
        arrivals: ParticleBatch,
        timings: &mut Timings,
    ) -> Result<(), ContainerError> {
        let start = Instant::now();
        self.check_mapping("rebuild", new_element)?;
        self.check_arrivals("rebuild", &arrivals)?;
        self.place("rebuild", new_element, &arrivals, None)?;
        self.generation += 1;
        timings.record("rebuild", start.elapsed(), Duration::ZERO);
        Ok(())
    }

    pub(crate) fn check_mapping(
        &self,
        op: &'static str,
        new_element: &[Option<usize>],
    ) -> Result<(), ContainerError> {
        if new_element.len() != self.capacity() {
            return Err(ContainerError::Usage {
                op,
                rank: self.config.rank,
                reason: format!(
                    "mapping has {} entries but capacity is {}",
                    new_element.len(),
                    self.capacity()
                ),
            });
        }
        let n = self.num_elems();
        for (slot, target) in new_element.iter().enumerate() {
            if let Some(e) = *target {
                if e >= n && self.is_active(slot) {
                    return Err(ContainerError::InvalidTarget {
                        op,
                        rank: self.config.rank,
                        slot,
                        reason: format!("element {e} out of range 0..{n}"),
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn check_arrivals(
        &self,
        op: &'static str,
        arrivals: &ParticleBatch,
    ) -> Result<(), ContainerError> {
        if !arrivals.schema().same_layout(&self.schema) {
            return Err(ContainerError::Usage {
                op,
                rank: self.config.rank,
                reason: "arriving particles use a different field schema".into(),
            });
        }
        let n = self.num_elems();
        if let Some((i, &e)) = arrivals.elements().iter().enumerate().find(|(_, &e)| e >= n) {
            return Err(ContainerError::Usage {
                op,
                rank: self.config.rank,
                reason: format!("arriving particle {i} targets element {e} out of range 0..{n}"),
            });
        }
        Ok(())
    }

    /// Lay out retained particles followed by arrivals. Inputs must be
    /// validated. `blocks` forces the block count; otherwise the resize
    /// policy decides.
    pub(crate) fn place(
        &mut self,
        op: &'static str,
        new_element: &[Option<usize>],
        arrivals: &ParticleBatch,
        blocks: Option<usize>,
    ) -> Result<(), ContainerError> {
        let w = self.config.block_width;
        let n = self.num_elems();

        let mut counts = vec![0usize; n];
        let mut sources = Vec::with_capacity(self.num_ptcls + arrivals.len());
        for (slot, target) in new_element.iter().enumerate() {
            if let Some(e) = *target {
                if self.is_active(slot) {
                    counts[e] += 1;
                    sources.push((Source::Retained(slot), e));
                }
            }
        }
        for (i, &e) in arrivals.elements().iter().enumerate() {
            counts[e] += 1;
            sources.push((Source::Arrival(i), e));
        }

        let params = PlanParams::from_config(&self.config, n);
        let required = L::required_blocks(&counts, &params);
        let current = self.chunks.len();
        let blocks = blocks
            .or_else(|| resize_target(current, required, &self.config))
            .unwrap_or(current);
        let blocks = self.clamp_to_ceiling(op, required, blocks)?;
        if blocks > current && op != "construct" {
            tracing::warn!(
                name = %self.config.name,
                rank = self.config.rank.index(),
                op,
                old_capacity = current * w,
                new_capacity = blocks * w,
                "capacity grew beyond headroom"
            );
        } else if blocks < current {
            tracing::debug!(
                name = %self.config.name,
                rank = self.config.rank.index(),
                op,
                old_capacity = current * w,
                new_capacity = blocks * w,
                "capacity shrunk"
            );
        }

        let plan = L::plan(&counts, blocks, &params);
        let mut gather: Vec<Option<(Source, u32)>> = vec![None; blocks * w];
        let mut rank = vec![0usize; n];
        for (sequence, &(source, e)) in sources.iter().enumerate() {
            let slot = plan.slot_for(w, e, rank[e], sequence);
            rank[e] += 1;
            gather[slot] = Some((source, e as u32));
        }

        let mut staging = self.take_staging(op, blocks)?;
        let old = &self.chunks;
        let schema = &self.schema;
        let chunk_elements = &plan.chunk_elements;
        let incoming = arrivals.columns();
        for_each_chunk_mut::<S, _>(&mut staging, |b, chunk| {
            chunk.reset(chunk_elements[b]);
            for (lane, entry) in gather[b * w..(b + 1) * w].iter().enumerate() {
                match *entry {
                    Some((Source::Retained(slot), e)) => {
                        chunk.take_lane(lane, &old[slot / w].columns, slot % w, schema, e);
                    }
                    Some((Source::Arrival(i), e)) => {
                        chunk.take_lane(lane, incoming, i, schema, e);
                    }
                    None => {}
                }
            }
        });

        let retired = std::mem::replace(&mut self.chunks, staging);
        self.staging = if retired.len() == blocks {
            retired
        } else {
            Vec::new()
        };
        self.counts = counts;
        self.num_ptcls = sources.len();
        tracing::debug!(
            name = %self.config.name,
            rank = self.config.rank.index(),
            op,
            num_ptcls = self.num_ptcls,
            arrivals = arrivals.len(),
            capacity = self.capacity(),
            "particles placed"
        );
        Ok(())
    }

    /// Apply `max_capacity` and overflow checks to a block count.
    fn clamp_to_ceiling(
        &self,
        op: &'static str,
        required: usize,
        blocks: usize,
    ) -> Result<usize, ContainerError> {
        let w = self.config.block_width;
        let capacity_error = |requested_slots: usize, reason: String| ContainerError::Capacity {
            op,
            rank: self.config.rank,
            requested_slots,
            reason,
        };
        let Some(slots) = blocks.checked_mul(w) else {
            return Err(capacity_error(usize::MAX, format!("{blocks} blocks overflow the slot count")));
        };
        let Some(max) = self.config.max_capacity else {
            return Ok(blocks);
        };
        if slots <= max {
            return Ok(blocks);
        }
        let ceiling = max / w;
        if required <= ceiling {
            Ok(ceiling.max(required))
        } else {
            Err(capacity_error(
                required.saturating_mul(w),
                format!("exceeds max_capacity of {max} slots"),
            ))
        }
    }

    /// Storage for the next layout: the retired buffer when its size
    /// matches, a fresh allocation otherwise.
    fn take_staging(&mut self, op: &'static str, blocks: usize) -> Result<Vec<Chunk>, ContainerError> {
        if self.staging.len() == blocks {
            return Ok(std::mem::take(&mut self.staging));
        }
        self.staging = Vec::new();
        chunk::try_alloc(&self.schema, self.config.block_width, blocks).map_err(|e| {
            ContainerError::Capacity {
                op,
                rank: self.config.rank,
                requested_slots: blocks.saturating_mul(self.config.block_width),
                reason: e.to_string(),
            }
        })
    }
}
