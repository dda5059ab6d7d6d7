//! Deterministic particle fixtures.
//!
//! Every particle gets a pid unique across the process group
//! (`rank * PID_STRIDE + i`) and field values derived from that pid, so
//! tests can check values after arbitrary moves without keeping a copy.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use corral_core::{ElementGid, FieldDef, FieldKind, ParticleId, Rank, Schema};
use corral_store::{ParticleBatch, ParticleSnapshot, StoreConfig};

/// Pid offset between ranks.
pub const PID_STRIDE: u64 = 1_000_000;

/// `weight: f64`, `position: f64 x 3`, `charge: f32`, `origin: i32`,
/// `alive: bool`.
pub fn test_schema() -> Schema {
    Schema::new(vec![
        FieldDef::scalar("weight", FieldKind::F64),
        FieldDef::array("position", FieldKind::F64, 3),
        FieldDef::scalar("charge", FieldKind::F32),
        FieldDef::scalar("origin", FieldKind::I32),
        FieldDef::scalar("alive", FieldKind::Bool),
    ])
    .unwrap()
}

/// Small blocks so tests exercise multi-block elements.
pub fn test_config(rank: Rank) -> StoreConfig {
    StoreConfig {
        name: format!("test-{rank}"),
        block_width: 4,
        ..StoreConfig::for_rank(rank)
    }
}

/// Gid of the first element in the shared mesh.
pub const GID_BASE: u64 = 1000;

/// Element gids for `rank` over a mesh of `num_elems` elements that
/// every rank holds. Local order is rotated by the rank, so the same
/// local index names a different element on each rank and migration
/// has to resolve by gid.
pub fn gids_for_rank(rank: Rank, num_elems: usize) -> Vec<ElementGid> {
    (0..num_elems)
        .map(|i| ElementGid(GID_BASE + ((i + rank.index()) % num_elems) as u64))
        .collect()
}

/// Expected `weight` of a particle.
pub fn weight_of(pid: u64) -> f64 {
    pid as f64 * 0.25
}

/// Expected `position` of a particle.
pub fn position_of(pid: u64) -> [f64; 3] {
    let x = pid as f64;
    [x, -x, x * 0.5]
}

fn push_particle(batch: &mut ParticleBatch, schema: &Schema, element: usize, pid: u64, origin: Rank) {
    let weight = schema.field::<f64>("weight").unwrap();
    let position = schema.field::<f64>("position").unwrap();
    let charge = schema.field::<f32>("charge").unwrap();
    let origin_f = schema.field::<i32>("origin").unwrap();
    let alive = schema.field::<bool>("alive").unwrap();
    let i = batch.push(element, ParticleId(pid));
    batch.set(i, weight, &[weight_of(pid)]);
    batch.set(i, position, &position_of(pid));
    batch.set(i, charge, &[(pid % 7) as f32 - 3.0]);
    batch.set(i, origin_f, &[origin.index() as i32]);
    batch.set(i, alive, &[pid % 2 == 0]);
}

/// `per_element` particles in each of `num_elems` elements on `rank`.
pub fn uniform_snapshot(rank: Rank, num_elems: usize, per_element: usize) -> ParticleSnapshot {
    let schema = test_schema();
    let mut batch = ParticleBatch::with_capacity(schema.clone(), num_elems * per_element);
    let mut pid = rank.index() as u64 * PID_STRIDE;
    for e in 0..num_elems {
        for _ in 0..per_element {
            push_particle(&mut batch, &schema, e, pid, rank);
            pid += 1;
        }
    }
    ParticleSnapshot::from_batch(gids_for_rank(rank, num_elems), batch)
}

/// Between `0` and `max_per_element` particles per element, drawn from
/// a seeded generator.
pub fn random_snapshot(
    seed: u64,
    rank: Rank,
    num_elems: usize,
    max_per_element: usize,
) -> ParticleSnapshot {
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ rank.index() as u64);
    let schema = test_schema();
    let mut batch = ParticleBatch::new(schema.clone());
    let mut pid = rank.index() as u64 * PID_STRIDE;
    for e in 0..num_elems {
        let n = rng.random_range(0..=max_per_element);
        for _ in 0..n {
            push_particle(&mut batch, &schema, e, pid, rank);
            pid += 1;
        }
    }
    ParticleSnapshot::from_batch(gids_for_rank(rank, num_elems), batch)
}
