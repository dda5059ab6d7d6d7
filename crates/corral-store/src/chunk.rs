//! Fixed-width blocks of slots stored as struct-of-arrays.

use std::collections::TryReserveError;

use corral_core::{Column, Schema};

/// Parent value of a lane that holds no particle.
pub(crate) const NO_PARENT: u32 = u32::MAX;

/// One block of `width` slots.
///
/// `columns[k]` holds field `k` for every lane, `width * components`
/// values long. Values of inactive lanes are padding.
#[derive(Clone, Debug)]
pub(crate) struct Chunk {
    /// Element this block belongs to, or `None` for spare headroom and
    /// for layouts that mix elements inside a block.
    pub(crate) element: Option<u32>,
    pub(crate) active: Vec<bool>,
    pub(crate) parents: Vec<u32>,
    pub(crate) columns: Vec<Column>,
}

impl Chunk {
    pub(crate) fn try_new(schema: &Schema, width: usize) -> Result<Self, TryReserveError> {
        let mut columns = Vec::new();
        columns.try_reserve_exact(schema.len())?;
        for def in schema.fields() {
            columns.push(Column::try_zeroed(def.kind, width * def.components as usize)?);
        }
        let mut active = Vec::new();
        active.try_reserve_exact(width)?;
        active.resize(width, false);
        let mut parents = Vec::new();
        parents.try_reserve_exact(width)?;
        parents.resize(width, NO_PARENT);
        Ok(Self {
            element: None,
            active,
            parents,
            columns,
        })
    }

    /// Mark every lane inactive. Column data is left as padding.
    pub(crate) fn reset(&mut self, element: Option<u32>) {
        self.element = element;
        self.active.fill(false);
        self.parents.fill(NO_PARENT);
    }

    pub(crate) fn width(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn active_lanes(&self) -> usize {
        self.active.iter().filter(|a| **a).count()
    }

    /// Copy every field of `src` lane `src_lane` into `dst_lane` and
    /// activate it under `parent`.
    pub(crate) fn take_lane(
        &mut self,
        dst_lane: usize,
        src: &[Column],
        src_lane: usize,
        schema: &Schema,
        parent: u32,
    ) {
        for ((dst, src), def) in self.columns.iter_mut().zip(src).zip(schema.fields()) {
            let copied = dst.copy_lane(dst_lane, src, src_lane, def.components as usize);
            debug_assert!(copied, "column kind mismatch for field '{}'", def.name);
        }
        self.active[dst_lane] = true;
        self.parents[dst_lane] = parent;
    }
}

/// Allocate `count` empty blocks, reporting allocation failure.
pub(crate) fn try_alloc(
    schema: &Schema,
    width: usize,
    count: usize,
) -> Result<Vec<Chunk>, TryReserveError> {
    let mut chunks = Vec::new();
    chunks.try_reserve_exact(count)?;
    for _ in 0..count {
        chunks.push(Chunk::try_new(schema, width)?);
    }
    Ok(chunks)
}
