//! Multi-rank migration scenarios on the in-process transport.

use std::collections::{BTreeMap, BTreeSet};

use corral_comm::{Distributor, Transport};
use corral_core::{ContainerError, ElementGid, Rank, Timings};
use corral_store::compliance::{active_particles, assert_invariants, current_mapping};
use corral_store::{
    BlockContainer, CsrContainer, FlatContainer, ParticleContainer, ParticleSnapshot, StoreConfig,
    TeamContainer,
};
use corral_test_utils::{
    position_of, random_snapshot, run_ranks, test_config, uniform_snapshot, weight_of,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// pid -> (element gid, weight, origin rank)
fn info<C: ParticleContainer>(c: &C) -> BTreeMap<u64, (ElementGid, f64, i32)> {
    let schema = c.schema();
    let weight = c.get(schema.field::<f64>("weight").unwrap());
    let origin = c.get(schema.field::<i32>("origin").unwrap());
    active_particles(c)
        .into_iter()
        .map(|(pid, (slot, e))| {
            (pid, (c.element_gids()[e], weight.get(slot), origin.get(slot)))
        })
        .collect()
}

fn origin_ranks<C: ParticleContainer>(c: &C) -> Vec<Rank> {
    let origin = c.get(c.schema().field::<i32>("origin").unwrap());
    (0..c.capacity())
        .map(|slot| Rank(origin.get(slot).max(0) as usize))
        .collect()
}

fn shift_right_and_back<C: ParticleContainer>(size: usize) {
    let results = run_ranks(size, |t| {
        let me = t.rank();
        let mut c = C::from_snapshot(test_config(me), uniform_snapshot(me, 6, 5)).unwrap();
        let before = info(&c);
        let right = Rank((me.index() + 1) % size);
        let mut timings = Timings::new();

        let map = current_mapping(&c);
        let procs = vec![right; c.capacity()];
        c.migrate(&map, &procs, None, &t, &mut timings).unwrap();
        assert_invariants(&c);
        let shifted = info(&c);

        let map = current_mapping(&c);
        let procs = origin_ranks(&c);
        c.migrate(&map, &procs, None, &t, &mut timings).unwrap();
        assert_invariants(&c);
        assert_eq!(timings.get("migrate").unwrap().calls, 2);
        (before, shifted, info(&c))
    });

    for (r, (before, shifted, home)) in results.iter().enumerate() {
        assert_eq!(before, home, "rank {r} did not get its particles back");
        let left = (r + size - 1) % size;
        assert_eq!(shifted, &results[left].0, "rank {r} should hold rank {left}'s particles");
    }
}

#[test]
fn four_ranks_send_right_then_back() {
    shift_right_and_back::<BlockContainer>(4);
}

#[test]
fn every_variant_migrates() {
    shift_right_and_back::<CsrContainer>(3);
    shift_right_and_back::<FlatContainer>(3);
    shift_right_and_back::<TeamContainer>(2);
}

#[test]
fn neighbour_distributor_bounds_message_count() {
    const SIZE: usize = 5;
    let results = run_ranks(SIZE, |t| {
        let me = t.rank();
        let left = Rank((me.index() + SIZE - 1) % SIZE);
        let right = Rank((me.index() + 1) % SIZE);
        let dist = Distributor::new(me, [left, me, right]).unwrap();
        let mut c =
            <CsrContainer>::from_snapshot(test_config(me), random_snapshot(11, me, 8, 6)).unwrap();
        let global_before = t.all_reduce_sum(c.num_ptcls() as u64).unwrap();

        let pids = c.get(c.schema().pid());
        let procs: Vec<Rank> = (0..c.capacity())
            .map(|slot| match pids.get(slot) % 3 {
                0 => left,
                1 => right,
                _ => me,
            })
            .collect();
        let map = current_mapping(&c);

        // Input agreement costs the same traffic as one group reduction.
        let reduce_start = t.messages_sent();
        t.all_reduce_sum(0).unwrap();
        let agreement = t.messages_sent() - reduce_start;

        let sent_before = t.messages_sent();
        c.migrate(&map, &procs, Some(&dist), &t, &mut Timings::new())
            .unwrap();
        let messages = t.messages_sent() - sent_before - agreement;
        assert_invariants(&c);

        // Every particle now here started on this rank or a neighbour.
        let by_slot = origin_ranks(&c);
        let origins: BTreeSet<Rank> = active_particles(&c)
            .values()
            .map(|&(slot, _)| by_slot[slot])
            .collect();
        let allowed = BTreeSet::from([left, me, right]);

        let global_after = t.all_reduce_sum(c.num_ptcls() as u64).unwrap();
        (global_before, global_after, messages, origins, allowed)
    });

    for (before, after, messages, origins, allowed) in results {
        assert_eq!(before, after);
        // one count and at most one payload per neighbour
        assert!(messages <= 4, "sent {messages} messages");
        assert!(
            origins.is_subset(&allowed),
            "origins {origins:?} outside {allowed:?}"
        );
    }
}

#[test]
fn random_migration_conserves_particles_and_values() {
    const SIZE: usize = 3;
    let results = run_ranks(SIZE, |t| {
        let me = t.rank();
        let mut c =
            <BlockContainer>::from_snapshot(test_config(me), random_snapshot(5, me, 10, 9)).unwrap();
        let before: BTreeSet<u64> = active_particles(&c).keys().copied().collect();

        let mut rng = ChaCha8Rng::seed_from_u64(99 + me.index() as u64);
        let map: Vec<Option<usize>> = (0..c.capacity())
            .map(|_| Some(rng.random_range(0..c.num_elems())))
            .collect();
        let procs: Vec<Rank> = (0..c.capacity())
            .map(|_| Rank(rng.random_range(0..SIZE)))
            .collect();
        c.migrate(&map, &procs, None, &t, &mut Timings::new()).unwrap();
        assert_invariants(&c);

        let weight = c.get(c.schema().field::<f64>("weight").unwrap());
        let position = c.get(c.schema().field::<f64>("position").unwrap());
        let after = active_particles(&c);
        for (&pid, &(slot, _)) in &after {
            assert_eq!(weight.get(slot), weight_of(pid));
            assert_eq!(position.components(slot), &position_of(pid));
        }
        (before, after.keys().copied().collect::<BTreeSet<u64>>())
    });

    let mut before = BTreeSet::new();
    let mut after = BTreeSet::new();
    let mut after_total = 0;
    for (b, a) in results {
        before.extend(b);
        after_total += a.len();
        after.extend(a);
    }
    assert_eq!(before, after);
    assert_eq!(after_total, after.len(), "a particle was duplicated");
}

#[test]
fn removal_during_migration() {
    let results = run_ranks(2, |t| {
        let me = t.rank();
        let mut c = <FlatContainer>::from_snapshot(test_config(me), uniform_snapshot(me, 4, 4)).unwrap();
        let pids = c.get(c.schema().pid());
        let map: Vec<Option<usize>> = (0..c.capacity())
            .map(|slot| (pids.get(slot) % 2 == 0).then_some(0))
            .collect();
        let procs = vec![Rank(1 - me.index()); c.capacity()];
        c.migrate(&map, &procs, None, &t, &mut Timings::new()).unwrap();
        c.num_ptcls()
    });
    assert_eq!(results, vec![8, 8]);
}

#[test]
fn unknown_gid_fails_on_receiver_without_touching_storage() {
    let results = run_ranks(2, |t| {
        let me = t.rank();
        let mut snapshot = uniform_snapshot(me, 3, 2);
        if me == Rank(1) {
            snapshot.element_gids = vec![ElementGid(7), ElementGid(8), ElementGid(9)];
        }
        let mut c = <BlockContainer>::from_snapshot(test_config(me), snapshot).unwrap();
        let generation = c.generation();
        let before = c.num_ptcls();
        let map = current_mapping(&c);
        let procs = vec![Rank(1); c.capacity()];
        let out = c.migrate(&map, &procs, None, &t, &mut Timings::new());
        (out, before, c.num_ptcls(), c.generation() - generation)
    });

    let (ok, _, after0, _) = &results[0];
    assert!(ok.is_ok());
    assert_eq!(*after0, 0);

    let (err, before1, after1, bumps) = &results[1];
    match err {
        Err(ContainerError::UnknownElementGid { op, rank, .. }) => {
            assert_eq!(*op, "migrate");
            assert_eq!(*rank, Rank(1));
        }
        other => panic!("expected unknown gid error, got {other:?}"),
    }
    assert_eq!(before1, after1);
    assert_eq!(*bumps, 0);
}

#[test]
fn destination_outside_distributor_is_rejected_locally() {
    let results = run_ranks(3, |t| {
        let me = t.rank();
        let dist = Distributor::new(me, [me]).unwrap();
        let mut c = <BlockContainer>::from_snapshot(test_config(me), uniform_snapshot(me, 2, 2)).unwrap();
        let map = current_mapping(&c);
        let procs = vec![Rank((me.index() + 1) % 3); c.capacity()];
        c.migrate(&map, &procs, Some(&dist), &t, &mut Timings::new())
    });
    for r in results {
        assert!(matches!(r, Err(ContainerError::InvalidTarget { .. })));
    }
}

#[test]
fn one_rank_rejecting_its_input_fails_every_rank_alike() {
    let results = run_ranks(2, |t| {
        let me = t.rank();
        let dist = if me == Rank(0) {
            Distributor::new(me, [me]).unwrap()
        } else {
            Distributor::world(me, 2).unwrap()
        };
        let mut c = <BlockContainer>::from_snapshot(test_config(me), uniform_snapshot(me, 2, 2)).unwrap();
        let before = c.num_ptcls();
        let generation = c.generation();
        let map = current_mapping(&c);
        let procs = vec![Rank(1); c.capacity()];
        let err = c
            .migrate(&map, &procs, Some(&dist), &t, &mut Timings::new())
            .unwrap_err();

        // No rank was left inside the exchange.
        let stay = vec![me; c.capacity()];
        let map = current_mapping(&c);
        c.migrate(&map, &stay, None, &t, &mut Timings::new()).unwrap();
        (err, before == c.num_ptcls(), c.generation() - generation)
    });

    let (err0, kept0, bumps0) = &results[0];
    assert!(matches!(err0, ContainerError::InvalidTarget { op: "migrate", .. }));
    let (err1, kept1, bumps1) = &results[1];
    assert!(matches!(
        err1,
        ContainerError::PeerRejected {
            op: "migrate",
            failed_ranks: 1,
            ..
        }
    ));
    for err in [err0, err1] {
        assert!(err.is_collective_fatal());
    }
    assert!(*kept0 && *kept1);
    assert_eq!((*bumps0, *bumps1), (1, 1));
}

#[test]
fn prebarrier_is_recorded() {
    let results = run_ranks(2, |t| {
        let me = t.rank();
        let config = StoreConfig {
            prebarrier: true,
            ..test_config(me)
        };
        let snapshot: ParticleSnapshot = uniform_snapshot(me, 2, 3);
        let mut c = <BlockContainer>::from_snapshot(config, snapshot).unwrap();
        let map = current_mapping(&c);
        let procs = vec![me; c.capacity()];
        let mut timings = Timings::new();
        c.migrate(&map, &procs, None, &t, &mut timings).unwrap();
        timings.get("migrate").map(|e| e.calls)
    });
    assert_eq!(results, vec![Some(1), Some(1)]);
}
