//! Typed field access.
//!
//! A [`FieldView`] borrows the container immutably and a [`SlotMut`]
//! borrows one block mutably, so neither can outlive the storage
//! layout it was taken from.

use std::marker::PhantomData;

use corral_core::{Field, FieldKey, FieldType, ParticleId, Schema};

use crate::chunk::Chunk;
use crate::layout::Layout;
use crate::space::MemorySpace;
use crate::store::ParticleStore;

/// Read-only view of one field across every slot.
///
/// Values at inactive slots are padding; check
/// [`is_active`](Self::is_active) before interpreting them.
#[derive(Clone, Copy, Debug)]
pub struct FieldView<'a, T: FieldType> {
    chunks: &'a [Chunk],
    key: usize,
    components: usize,
    width: usize,
    _marker: PhantomData<T>,
}

impl<'a, T: FieldType> FieldView<'a, T> {
    /// Number of slots covered.
    pub fn len(&self) -> usize {
        self.chunks.len() * self.width
    }

    /// Whether the container has no slots.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Components per particle.
    pub fn components_per_slot(&self) -> usize {
        self.components
    }

    /// Whether `slot` holds a particle.
    pub fn is_active(&self, slot: usize) -> bool {
        self.chunks[slot / self.width].active[slot % self.width]
    }

    /// All components of `slot`.
    pub fn components(&self, slot: usize) -> &'a [T] {
        let chunk = &self.chunks[slot / self.width];
        let lane = slot % self.width;
        let data = T::slice(&chunk.columns[self.key])
            .unwrap_or_else(|| unreachable!("field kind verified when the view was created"));
        &data[lane * self.components..(lane + 1) * self.components]
    }

    /// Component `component` of `slot`.
    pub fn value(&self, slot: usize, component: usize) -> T {
        self.components(slot)[component]
    }

    /// First component of `slot`; the whole value for scalar fields.
    pub fn get(&self, slot: usize) -> T {
        self.value(slot, 0)
    }
}

impl<L: Layout, S: MemorySpace> ParticleStore<L, S> {
    /// Typed view of `field` over every slot.
    ///
    /// # Panics
    ///
    /// Panics if `field` was resolved from a schema with a different
    /// layout.
    pub fn get<T: FieldType>(&self, field: Field<T>) -> FieldView<'_, T> {
        check_handle(&self.schema, field);
        FieldView {
            chunks: &self.chunks,
            key: field.key().index(),
            components: field.components(),
            width: self.config.block_width,
            _marker: PhantomData,
        }
    }
}

pub(crate) fn check_handle<T: FieldType>(schema: &Schema, field: Field<T>) {
    let def = schema.def(field.key());
    assert!(
        def.is_some_and(|d| d.kind == T::KIND && d.components as usize == field.components()),
        "field handle {} does not belong to this container's schema",
        field.key().0
    );
}

/// Mutable access to one slot during
/// [`parallel_for_mut`](ParticleStore::parallel_for_mut).
///
/// The `pid` field is read-only: identity never changes in place.
pub struct SlotMut<'a> {
    pub(crate) schema: &'a Schema,
    pub(crate) chunk: &'a mut Chunk,
    pub(crate) lane: usize,
    pub(crate) slot: usize,
    pub(crate) element: usize,
}

impl SlotMut<'_> {
    /// Slot index.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Element of the slot, or `NO_ELEMENT` for spare storage.
    pub fn element(&self) -> usize {
        self.element
    }

    /// Whether the slot holds a particle.
    pub fn is_active(&self) -> bool {
        self.chunk.active[self.lane]
    }

    /// Identity of the particle, if the slot is active.
    pub fn pid(&self) -> Option<ParticleId> {
        self.is_active().then(|| {
            let pids = u64::slice(&self.chunk.columns[FieldKey::PID.index()])
                .unwrap_or_else(|| unreachable!("pid column is always u64"));
            ParticleId(pids[self.lane])
        })
    }

    /// Components of `field` in this slot.
    ///
    /// # Panics
    ///
    /// Panics if `field` was resolved from a different schema.
    pub fn get<T: FieldType>(&self, field: Field<T>) -> &[T] {
        check_handle(self.schema, field);
        let n = field.components();
        let data = T::slice(&self.chunk.columns[field.key().index()])
            .unwrap_or_else(|| panic!("field {} is not {}", field.key().0, T::KIND));
        &data[self.lane * n..(self.lane + 1) * n]
    }

    /// Mutable components of `field` in this slot.
    ///
    /// # Panics
    ///
    /// Panics when `field` is the `pid` field or was resolved from a
    /// different schema.
    pub fn get_mut<T: FieldType>(&mut self, field: Field<T>) -> &mut [T] {
        assert!(field.key() != FieldKey::PID, "pid is read-only");
        check_handle(self.schema, field);
        let n = field.components();
        let data = T::slice_mut(&mut self.chunk.columns[field.key().index()])
            .unwrap_or_else(|| panic!("field {} is not {}", field.key().0, T::KIND));
        &mut data[self.lane * n..(self.lane + 1) * n]
    }

    /// Set the first component of `field`.
    pub fn set<T: FieldType>(&mut self, field: Field<T>, value: T) {
        self.get_mut(field)[0] = value;
    }
}
