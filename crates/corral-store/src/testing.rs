//! Shared fixtures for unit tests.

use corral_core::{ElementGid, FieldDef, FieldKind, ParticleId, Schema};

use crate::batch::{ParticleBatch, ParticleSnapshot};
use crate::config::StoreConfig;

pub(crate) const SAMPLE_COUNTS: [usize; 5] = [3, 0, 7, 1, 5];

pub(crate) fn small_config() -> StoreConfig {
    StoreConfig {
        name: "unit".into(),
        block_width: 4,
        ..StoreConfig::default()
    }
}

pub(crate) fn schema() -> Schema {
    Schema::new(vec![
        FieldDef::scalar("weight", FieldKind::F64),
        FieldDef::array("position", FieldKind::F64, 3),
        FieldDef::scalar("hits", FieldKind::I32),
    ])
    .unwrap()
}

/// Particle `i` has pid `i`, weight `i / 2`, and position `[i, i+1, i+2]`.
pub(crate) fn batch_for(counts: &[usize]) -> ParticleBatch {
    let s = schema();
    let weight = s.field::<f64>("weight").unwrap();
    let position = s.field::<f64>("position").unwrap();
    let mut batch = ParticleBatch::new(s);
    let mut pid = 0u64;
    for (e, &n) in counts.iter().enumerate() {
        for _ in 0..n {
            let i = batch.push(e, ParticleId(pid));
            let x = pid as f64;
            batch.set(i, weight, &[x / 2.0]);
            batch.set(i, position, &[x, x + 1.0, x + 2.0]);
            pid += 1;
        }
    }
    batch
}

pub(crate) fn gids(n: usize) -> Vec<ElementGid> {
    (0..n as u64).map(|i| ElementGid(100 + i)).collect()
}

pub(crate) fn sample_snapshot() -> ParticleSnapshot {
    ParticleSnapshot::from_batch(gids(SAMPLE_COUNTS.len()), batch_for(&SAMPLE_COUNTS))
}
