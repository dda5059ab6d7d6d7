//! Benchmark profiles for the Corral particle containers.
//!
//! - [`reference_profile`]: 1K elements, about 64K particles
//! - [`stress_profile`]: 16K elements, about 1M particles
//! - [`skewed_counts`]: seeded per-element counts with hot spots

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use corral_core::{ElementGid, FieldDef, FieldKind, ParticleId, Rank, Schema};
use corral_store::{ParticleBatch, ParticleContainer, ParticleSnapshot, StoreConfig};

/// One element in this many is a hot spot.
const HOT_EVERY: u64 = 16;

/// A container configuration and the snapshot to build it from.
#[derive(Clone, Debug)]
pub struct Profile {
    /// Store settings.
    pub config: StoreConfig,
    /// Initial content.
    pub snapshot: ParticleSnapshot,
}

/// `position: f64 x 3`, `velocity: f64 x 3`, `weight: f64`.
pub fn bench_schema() -> Schema {
    Schema::new(vec![
        FieldDef::array("position", FieldKind::F64, 3),
        FieldDef::array("velocity", FieldKind::F64, 3),
        FieldDef::scalar("weight", FieldKind::F64),
    ])
    .expect("bench schema is valid")
}

/// Particle count per element: uniform around `mean`, with one element
/// in [`HOT_EVERY`] carrying eight times as many.
pub fn skewed_counts(num_elems: usize, mean: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..num_elems)
        .map(|_| {
            let base = rng.random_range(mean / 2..=mean + mean / 2);
            if rng.random_range(0..HOT_EVERY) == 0 {
                base * 8
            } else {
                base
            }
        })
        .collect()
}

/// Profile for `rank` with the given counts. Element gids are the
/// element indices, identical on every rank.
pub fn profile_from_counts(rank: Rank, counts: &[usize]) -> Profile {
    let schema = bench_schema();
    let position = schema.field::<f64>("position").expect("position field");
    let velocity = schema.field::<f64>("velocity").expect("velocity field");
    let weight = schema.field::<f64>("weight").expect("weight field");

    let total: usize = counts.iter().sum();
    let mut batch = ParticleBatch::with_capacity(schema, total);
    let mut pid = (rank.index() as u64) << 40;
    for (e, &n) in counts.iter().enumerate() {
        for k in 0..n {
            let i = batch.push(e, ParticleId(pid));
            let x = e as f64 + k as f64 / n as f64;
            batch.set(i, position, &[x, 0.5, 0.5]);
            batch.set(i, velocity, &[0.01, 0.0, 0.0]);
            batch.set(i, weight, &[1.0]);
            pid += 1;
        }
    }
    let gids = (0..counts.len() as u64).map(ElementGid).collect();
    Profile {
        config: StoreConfig {
            name: format!("bench-{rank}"),
            ..StoreConfig::for_rank(rank)
        },
        snapshot: ParticleSnapshot::from_batch(gids, batch),
    }
}

/// 1K elements, mean 64 particles each.
pub fn reference_profile(seed: u64, rank: Rank) -> Profile {
    profile_from_counts(rank, &skewed_counts(1_000, 64, seed))
}

/// 16K elements, mean 64 particles each.
pub fn stress_profile(seed: u64, rank: Rank) -> Profile {
    profile_from_counts(rank, &skewed_counts(16_000, 64, seed))
}

/// Mapping that moves every `every`-th slot's particle `offset`
/// elements forward, wrapping, and keeps the rest in place.
pub fn shift_mapping<C: ParticleContainer>(c: &C, offset: usize, every: usize) -> Vec<Option<usize>> {
    let n = c.num_elems();
    corral_store::compliance::current_mapping(c)
        .into_iter()
        .enumerate()
        .map(|(slot, e)| e.map(|e| if slot % every == 0 { (e + offset) % n } else { e }))
        .collect()
}
