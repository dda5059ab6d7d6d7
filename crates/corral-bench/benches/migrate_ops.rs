//! Criterion benchmarks for collective migration over the in-process transport.

use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, Criterion};
use corral_bench::reference_profile;
use corral_comm::{Distributor, Transport};
use corral_core::{Rank, Timings};
use corral_store::compliance::current_mapping;
use corral_store::BlockContainer;
use corral_test_utils::run_ranks;

const RANKS: usize = 4;

/// Run `iters` migrations per rank, each sending one slot in `every`
/// to the right neighbour. Returns the slowest rank's time.
fn migrate_ring(iters: u64, every: Option<usize>, neighbours_only: bool) -> Duration {
    let times = run_ranks(RANKS, |t| {
        let me = t.rank();
        let p = reference_profile(42, me);
        let mut c = <BlockContainer>::from_snapshot(p.config, p.snapshot).unwrap();
        let right = Rank((me.index() + 1) % RANKS);
        let left = Rank((me.index() + RANKS - 1) % RANKS);
        let distributor = neighbours_only
            .then(|| Distributor::new(me, [left, me, right]).unwrap());
        let mut timings = Timings::new();

        let start = Instant::now();
        for _ in 0..iters {
            let elements = current_mapping(&c);
            let procs: Vec<Rank> = (0..elements.len())
                .map(|slot| if every.is_some_and(|k| slot % k == 0) { right } else { me })
                .collect();
            c.migrate(&elements, &procs, distributor.as_ref(), &t, &mut timings)
                .unwrap();
        }
        start.elapsed()
    });
    times.into_iter().max().unwrap_or_default()
}

/// Benchmark: 4-rank ring migration, 10% of particles per call.
fn bench_migrate_world(c: &mut Criterion) {
    c.bench_function("migrate_ring_world", |b| {
        b.iter_custom(|iters| migrate_ring(iters, Some(10), false));
    });
}

/// Benchmark: same ring with a neighbour-only distributor.
fn bench_migrate_neighbours(c: &mut Criterion) {
    c.bench_function("migrate_ring_neighbours", |b| {
        b.iter_custom(|iters| migrate_ring(iters, Some(10), true));
    });
}

/// Benchmark: migration where nothing leaves, measuring the count exchange.
fn bench_migrate_stay(c: &mut Criterion) {
    c.bench_function("migrate_ring_stay", |b| {
        b.iter_custom(|iters| migrate_ring(iters, None, false));
    });
}

criterion_group!(
    benches,
    bench_migrate_world,
    bench_migrate_neighbours,
    bench_migrate_stay
);
criterion_main!(benches);
