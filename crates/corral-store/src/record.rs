//! Wire format of a migrating particle.
//!
//! One record is `[destination element gid: u64 LE][field tuple]`, where
//! the tuple is every schema field in key order (so `pid` first), each
//! component little-endian and `bool` as one byte. Records are fixed
//! width for a given schema.

use corral_core::{ElementGid, Schema};

use crate::chunk::Chunk;

const GID_BYTES: usize = 8;

/// Encoded size of one record.
pub(crate) fn record_width(schema: &Schema) -> usize {
    GID_BYTES + schema.record_bytes()
}

/// Append lane `lane` of `chunk` as a record bound for element `gid`.
pub(crate) fn encode(out: &mut Vec<u8>, gid: ElementGid, chunk: &Chunk, lane: usize, schema: &Schema) {
    out.extend_from_slice(&gid.0.to_le_bytes());
    for (col, def) in chunk.columns.iter().zip(schema.fields()) {
        col.encode_lane(lane, def.components as usize, out);
    }
}

/// Destination gid of a record.
pub(crate) fn gid(record: &[u8]) -> ElementGid {
    let mut buf = [0u8; GID_BYTES];
    buf.copy_from_slice(&record[..GID_BYTES]);
    ElementGid(u64::from_le_bytes(buf))
}

/// Field tuple of a record.
pub(crate) fn tuple(record: &[u8]) -> &[u8] {
    &record[GID_BYTES..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ParticleBatch;
    use crate::chunk::Chunk;
    use crate::testing::{batch_for, schema};
    use corral_core::ParticleId;

    #[test]
    fn record_layout_is_gid_then_tuple() {
        let s = schema();
        let batch = batch_for(&[3]);
        let mut chunk = Chunk::try_new(&s, 4).unwrap();
        chunk.take_lane(1, batch.columns(), 2, &s, 0);

        let mut out = Vec::new();
        encode(&mut out, ElementGid(0xABCD), &chunk, 1, &s);
        assert_eq!(out.len(), record_width(&s));
        assert_eq!(gid(&out), ElementGid(0xABCD));
        // pid 2 follows the gid
        assert_eq!(&out[8..16], &2u64.to_le_bytes());

        let mut decoded = ParticleBatch::new(s.clone());
        decoded.push_encoded(0, tuple(&out));
        assert_eq!(decoded.pid(0), ParticleId(2));
        let position = s.field::<f64>("position").unwrap();
        assert_eq!(decoded.values(0, position), &[2.0, 3.0, 4.0]);
    }
}
