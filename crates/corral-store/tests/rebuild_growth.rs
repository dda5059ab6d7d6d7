//! Capacity growth and local rebuild behaviour through the public API.

use corral_core::{ContainerError, ParticleId, Rank, Timings};
use corral_store::compliance::{active_particles, assert_invariants, current_mapping};
use corral_store::{BlockContainer, FlatContainer, ParticleBatch, ParticleSnapshot, StoreConfig};
use corral_test_utils::{
    gids_for_rank, random_snapshot, test_config, test_schema, uniform_snapshot, weight_of,
};
use proptest::prelude::*;

fn arrivals(n: usize, num_elems: usize, first_pid: u64) -> ParticleBatch {
    let schema = test_schema();
    let weight = schema.field::<f64>("weight").unwrap();
    let mut batch = ParticleBatch::new(schema);
    for i in 0..n {
        let pid = first_pid + i as u64;
        let idx = batch.push(i % num_elems, ParticleId(pid));
        batch.set(idx, weight, &[weight_of(pid)]);
    }
    batch
}

#[test]
fn empty_container_grows_to_fit_arrivals() {
    let snapshot = ParticleSnapshot::empty(test_schema(), gids_for_rank(Rank(0), 4));
    let mut c = <BlockContainer>::from_snapshot(test_config(Rank(0)), snapshot).unwrap();
    assert_eq!(c.num_ptcls(), 0);

    let mut timings = Timings::new();
    for round in 0..4u64 {
        let map = current_mapping(&c);
        let before = c.num_ptcls();
        c.rebuild_with(&map, arrivals(25, 4, round * 100), &mut timings)
            .unwrap();
        assert_eq!(c.num_ptcls(), before + 25);
        assert_invariants(&c);
    }
    let weight = c.get(c.schema().field::<f64>("weight").unwrap());
    for (pid, (slot, _)) in active_particles(&c) {
        assert_eq!(weight.get(slot), weight_of(pid));
    }
    assert_eq!(timings.get("rebuild").unwrap().calls, 4);
}

#[test]
fn growth_sequence_is_deterministic() {
    let run = || {
        let snapshot = ParticleSnapshot::empty(test_schema(), gids_for_rank(Rank(0), 3));
        let mut c = <FlatContainer>::from_snapshot(test_config(Rank(0)), snapshot).unwrap();
        let mut caps = vec![c.capacity()];
        for round in 0..6u64 {
            let map = current_mapping(&c);
            c.rebuild_with(&map, arrivals(9, 3, round * 10), &mut Timings::new())
                .unwrap();
            caps.push(c.capacity());
        }
        caps
    };
    let a = run();
    assert_eq!(a, run());
    assert!(a.windows(2).all(|w| w[0] <= w[1]), "capacity shrank without min_occupancy: {a:?}");
}

#[test]
fn shrink_policy_reclaims_storage() {
    let config = StoreConfig {
        min_occupancy: 0.25,
        ..test_config(Rank(0))
    };
    let mut c = <BlockContainer>::from_snapshot(config, uniform_snapshot(Rank(0), 12, 16)).unwrap();
    let big = c.capacity();
    let pids = c.get(c.schema().pid());
    // keep four of 192 particles
    let map: Vec<Option<usize>> = current_mapping(&c)
        .into_iter()
        .enumerate()
        .map(|(slot, e)| e.filter(|_| pids.get(slot) % 48 == 0))
        .collect();
    c.rebuild(&map, &mut Timings::new()).unwrap();
    assert_eq!(c.num_ptcls(), 4);
    assert!(c.capacity() < big, "{} should be below {big}", c.capacity());
    assert_invariants(&c);
}

#[test]
fn out_of_range_target_leaves_container_untouched() {
    let mut c =
        <BlockContainer>::from_snapshot(test_config(Rank(0)), random_snapshot(8, Rank(0), 6, 7))
            .unwrap();
    let before = active_particles(&c);
    let mut map = current_mapping(&c);
    let slot = map.iter().position(Option::is_some).unwrap();
    map[slot] = Some(c.num_elems());
    let err = c.rebuild(&map, &mut Timings::new()).unwrap_err();
    assert!(matches!(err, ContainerError::InvalidTarget { op: "rebuild", .. }));
    assert!(!err.is_collective_fatal());
    assert_eq!(active_particles(&c), before);
    assert_invariants(&c);
}

#[test]
fn capacity_ceiling_is_fatal() {
    let config = StoreConfig {
        max_capacity: Some(16),
        ..test_config(Rank(0))
    };
    let snapshot = ParticleSnapshot::empty(test_schema(), gids_for_rank(Rank(0), 2));
    let mut c = <FlatContainer>::from_snapshot(config, snapshot).unwrap();
    let map = current_mapping(&c);
    let err = c
        .rebuild_with(&map, arrivals(17, 2, 0), &mut Timings::new())
        .unwrap_err();
    assert!(matches!(err, ContainerError::Capacity { .. }));
    assert!(err.is_collective_fatal());
    assert_eq!(c.num_ptcls(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn rebuild_twice_equals_rebuild_once(seed in any::<u64>(), shift in 0usize..5) {
        let mut c = <BlockContainer>::from_snapshot(
            test_config(Rank(0)),
            random_snapshot(seed, Rank(0), 5, 9),
        )
        .unwrap();
        let map: Vec<Option<usize>> = current_mapping(&c)
            .into_iter()
            .map(|e| e.map(|e| (e + shift) % 5))
            .collect();
        c.rebuild(&map, &mut Timings::new()).unwrap();
        let once = active_particles(&c)
            .into_iter()
            .map(|(pid, (_, e))| (pid, e))
            .collect::<Vec<_>>();
        let again = current_mapping(&c);
        c.rebuild(&again, &mut Timings::new()).unwrap();
        let twice = active_particles(&c)
            .into_iter()
            .map(|(pid, (_, e))| (pid, e))
            .collect::<Vec<_>>();
        prop_assert_eq!(once, twice);
        prop_assert!(c.validate().is_ok());
    }
}
