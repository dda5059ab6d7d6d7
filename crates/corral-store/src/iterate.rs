//! Parallel iteration over every slot.
//!
//! Work is split per block: each block is visited by exactly one task,
//! which is what makes [`SlotMut`] writes race-free without locking.
//! Whether blocks fan out across threads is decided by the container's
//! memory space.

use rayon::prelude::*;

use crate::chunk::Chunk;
use crate::layout::Layout;
use crate::space::MemorySpace;
use crate::store::ParticleStore;
use crate::view::SlotMut;

pub(crate) fn for_each_chunk<S, F>(chunks: &[Chunk], f: F)
where
    S: MemorySpace,
    F: Fn(usize, &Chunk) + Sync + Send,
{
    if S::CONCURRENT {
        chunks.par_iter().enumerate().for_each(|(b, c)| f(b, c));
    } else {
        chunks.iter().enumerate().for_each(|(b, c)| f(b, c));
    }
}

pub(crate) fn for_each_chunk_mut<S, F>(chunks: &mut [Chunk], f: F)
where
    S: MemorySpace,
    F: Fn(usize, &mut Chunk) + Sync + Send,
{
    if S::CONCURRENT {
        chunks.par_iter_mut().enumerate().for_each(|(b, c)| f(b, c));
    } else {
        chunks.iter_mut().enumerate().for_each(|(b, c)| f(b, c));
    }
}

impl<L: Layout, S: MemorySpace> ParticleStore<L, S> {
    /// Call `f(element, slot, active)` exactly once for every slot.
    ///
    /// Slots run in no particular order and possibly concurrently; the
    /// call returns after all of them finished. Inactive slots in spare
    /// blocks report `NO_ELEMENT`.
    pub fn parallel_for<F>(&self, f: F)
    where
        F: Fn(usize, usize, bool) + Sync + Send,
    {
        let w = self.config.block_width;
        for_each_chunk::<S, _>(&self.chunks, |b, chunk| {
            for lane in 0..w {
                f(Self::slot_element(chunk, lane), b * w + lane, chunk.active[lane]);
            }
        });
    }

    /// Call `f` exactly once for every slot with mutable access to the
    /// slot's fields.
    pub fn parallel_for_mut<F>(&mut self, f: F)
    where
        F: Fn(SlotMut<'_>) + Sync + Send,
    {
        let w = self.config.block_width;
        let schema = &self.schema;
        for_each_chunk_mut::<S, _>(&mut self.chunks, |b, chunk| {
            for lane in 0..w {
                let element = Self::slot_element(chunk, lane);
                f(SlotMut {
                    schema,
                    chunk: &mut *chunk,
                    lane,
                    slot: b * w + lane,
                    element,
                });
            }
        });
    }

    /// Number of active slots, counted from storage.
    pub fn count_active(&self) -> usize {
        if S::CONCURRENT {
            self.chunks.par_iter().map(Chunk::active_lanes).sum()
        } else {
            self.chunks.iter().map(Chunk::active_lanes).sum()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use corral_core::{FieldDef, FieldKind, Schema, NO_ELEMENT};

    use crate::container::{BlockContainer, FlatContainer};
    use crate::space::HostSpace;
    use crate::testing::{sample_snapshot, small_config};

    #[test]
    fn every_slot_visited_once() {
        let store = <BlockContainer>::from_snapshot(small_config(), sample_snapshot()).unwrap();
        let hits: Vec<AtomicU32> = (0..store.capacity()).map(|_| AtomicU32::new(0)).collect();
        store.parallel_for(|_, slot, _| {
            hits[slot].fetch_add(1, Ordering::Relaxed);
        });
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn active_flags_match_particle_count() {
        let store =
            BlockContainer::<HostSpace>::from_snapshot(small_config(), sample_snapshot()).unwrap();
        let active = AtomicUsize::new(0);
        store.parallel_for(|_, _, is_active| {
            if is_active {
                active.fetch_add(1, Ordering::Relaxed);
            }
        });
        assert_eq!(active.into_inner(), store.num_ptcls());
        assert_eq!(store.count_active(), store.num_ptcls());
    }

    #[test]
    fn spare_blocks_report_no_element() {
        let store = <BlockContainer>::from_snapshot(small_config(), sample_snapshot()).unwrap();
        let last_block = store.num_blocks() - 1;
        assert_eq!(store.block_element(last_block), None);
        let w = store.block_width();
        let spare = AtomicUsize::new(0);
        store.parallel_for(|element, slot, _| {
            if slot / w == last_block {
                assert_eq!(element, NO_ELEMENT);
                spare.fetch_add(1, Ordering::Relaxed);
            }
        });
        assert_eq!(spare.into_inner(), w);
    }

    #[test]
    fn slot_writes_are_visible_afterwards() {
        let mut store = <FlatContainer>::from_snapshot(small_config(), sample_snapshot()).unwrap();
        let weight = store.schema().field::<f64>("weight").unwrap();
        store.parallel_for_mut(|mut slot| {
            if slot.is_active() {
                let pid = slot.pid().unwrap().0 as f64;
                slot.set(weight, pid * 2.0);
            }
        });
        let view = store.get(weight);
        let pids = store.get(store.schema().pid());
        for slot in 0..store.capacity() {
            if view.is_active(slot) {
                assert_eq!(view.get(slot), pids.get(slot) as f64 * 2.0);
            }
        }
    }

    #[test]
    #[should_panic(expected = "pid is read-only")]
    fn pid_cannot_be_written() {
        let mut store =
            BlockContainer::<HostSpace>::from_snapshot(small_config(), sample_snapshot()).unwrap();
        let pid = store.schema().pid();
        store.parallel_for_mut(|mut slot| {
            if slot.is_active() {
                slot.set(pid, 0);
            }
        });
    }

    #[test]
    fn foreign_handle_cannot_write_a_neighbouring_lane() {
        let mut store =
            BlockContainer::<HostSpace>::from_snapshot(small_config(), sample_snapshot()).unwrap();
        let weight = store.schema().field::<f64>("weight").unwrap();
        let before: Vec<f64> = (0..4).map(|slot| store.get(weight).get(slot)).collect();

        // Same key and kind as `weight`, but two components wide.
        let other = Schema::new(vec![FieldDef::array("w", FieldKind::F64, 2)]).unwrap();
        let foreign = other.field::<f64>("w").unwrap();
        assert_eq!(foreign.key(), weight.key());

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            store.parallel_for_mut(|mut s| {
                if s.slot() == 0 {
                    s.get_mut(foreign)[1] = -99.0;
                }
            });
        }));
        assert!(outcome.is_err());
        let after: Vec<f64> = (0..4).map(|slot| store.get(weight).get(slot)).collect();
        assert_eq!(before, after);
    }
}
