//! ParticleContainer compliance test helpers.
//!
//! These functions check the contract every container variant must
//! honour. They are written against the trait only and reused by the
//! variant test suites.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use corral_core::{Timings, NO_ELEMENT};

use crate::container::ParticleContainer;
use crate::space::HostSpace;

/// Active particles as `pid -> (slot, element)`.
pub fn active_particles<C: ParticleContainer>(c: &C) -> BTreeMap<u64, (usize, usize)> {
    let pids = c.get(c.schema().pid());
    let mut out = BTreeMap::new();
    let elements: Vec<_> = (0..c.capacity()).map(|_| AtomicU32::new(u32::MAX)).collect();
    c.parallel_for(|element, slot, active| {
        if active {
            elements[slot].store(element as u32, Ordering::Relaxed);
        }
    });
    for (slot, e) in elements.into_iter().enumerate() {
        let e = e.into_inner();
        if e != u32::MAX {
            out.insert(pids.get(slot), (slot, e as usize));
        }
    }
    out
}

/// Assert the structural invariants: counts add up, capacity covers the
/// particles, and every active slot's element is in range.
pub fn assert_invariants<C: ParticleContainer>(c: &C) {
    if let Err(e) = c.validate() {
        panic!("{e}");
    }
    let total: usize = c.particles_per_element().iter().sum();
    assert_eq!(total, c.num_ptcls(), "per-element counts do not sum to total");
    assert!(c.capacity() >= c.num_ptcls(), "capacity below particle count");
    assert!(c.num_rows() >= c.num_elems(), "fewer rows than elements");
    assert_eq!(c.element_gids().len(), c.num_elems());
    for (pid, (slot, e)) in active_particles(c) {
        assert!(
            e < c.num_elems(),
            "particle {pid} in slot {slot} reports element {e}"
        );
    }
}

/// Assert `parallel_for` visits every slot exactly once and reports as
/// many active slots as there are particles.
pub fn assert_iteration_complete<C: ParticleContainer>(c: &C) {
    let hits: Vec<AtomicU32> = (0..c.capacity()).map(|_| AtomicU32::new(0)).collect();
    let active = AtomicU32::new(0);
    c.parallel_for(|element, slot, is_active| {
        hits[slot].fetch_add(1, Ordering::Relaxed);
        if is_active {
            assert_ne!(element, NO_ELEMENT, "active slot {slot} has no element");
            active.fetch_add(1, Ordering::Relaxed);
        }
    });
    for (slot, h) in hits.iter().enumerate() {
        assert_eq!(h.load(Ordering::Relaxed), 1, "slot {slot} visited wrong number of times");
    }
    assert_eq!(active.into_inner() as usize, c.num_ptcls());
}

/// Assert rebuilding every particle into its current element changes
/// neither membership nor counts, and that doing it twice is stable.
pub fn assert_rebuild_idempotent<C: ParticleContainer>(c: &mut C) {
    let before: BTreeMap<u64, usize> = active_particles(c)
        .into_iter()
        .map(|(pid, (_, e))| (pid, e))
        .collect();
    let counts = c.particles_per_element().to_vec();
    let mut timings = Timings::new();
    for round in 0..2 {
        let mapping = current_mapping(c);
        if let Err(e) = c.rebuild(&mapping, &mut timings) {
            panic!("identity rebuild round {round} failed: {e}");
        }
        let after: BTreeMap<u64, usize> = active_particles(c)
            .into_iter()
            .map(|(pid, (_, e))| (pid, e))
            .collect();
        assert_eq!(after, before, "identity rebuild changed membership");
        assert_eq!(c.particles_per_element(), counts.as_slice());
        assert_invariants(c);
    }
}

/// Assert a host mirror has the same shape and the same value for every
/// active particle's `f64` field `field`.
pub fn assert_mirror_matches<C: ParticleContainer>(c: &C, field: &str) {
    let m = c.mirror::<HostSpace>();
    assert_eq!(m.num_elems(), c.num_elems());
    assert_eq!(m.num_ptcls(), c.num_ptcls());
    assert_eq!(m.capacity(), c.capacity());
    assert_eq!(m.element_gids(), c.element_gids());
    assert_eq!(m.particles_per_element(), c.particles_per_element());
    assert_eq!(active_particles(&m), active_particles(c));

    let f = match c.schema().field::<f64>(field) {
        Ok(f) => f,
        Err(e) => panic!("{e}"),
    };
    let (a, b) = (c.get(f), m.get(f));
    for slot in 0..c.capacity() {
        if a.is_active(slot) {
            for (x, y) in a.components(slot).iter().zip(b.components(slot)) {
                assert!((x - y).abs() <= 1e-5, "slot {slot}: {x} != {y}");
            }
        }
    }
    assert_invariants(&m);
}

/// Assert removing every particle empties the container but keeps its
/// elements.
pub fn assert_remove_all<C: ParticleContainer>(c: &mut C) {
    let n = c.num_elems();
    let mapping = vec![None; c.capacity()];
    if let Err(e) = c.rebuild(&mapping, &mut Timings::new()) {
        panic!("remove-all rebuild failed: {e}");
    }
    assert_eq!(c.num_ptcls(), 0);
    assert_eq!(c.num_elems(), n);
    assert!(c.particles_per_element().iter().all(|&k| k == 0));
    assert_invariants(c);
}

/// Assert the metrics report agrees with the counts.
pub fn assert_metrics_consistent<C: ParticleContainer>(c: &C) {
    let mut timings = Timings::new();
    let m = c
        .report_metrics(&mut timings)
        .unwrap_or_else(|| panic!("metrics report failed"));
    assert_eq!(m.num_ptcls, c.num_ptcls());
    assert_eq!(m.capacity, c.capacity());
    assert_eq!(m.padding_slots, c.capacity() - c.num_ptcls());
    assert_eq!(timings.metric_failures(), 0);
}

/// Current element of every slot, `None` for inactive slots.
pub fn current_mapping<C: ParticleContainer>(c: &C) -> Vec<Option<usize>> {
    let mut mapping = vec![None; c.capacity()];
    for (_, (slot, e)) in active_particles(c) {
        mapping[slot] = Some(e);
    }
    mapping
}
