//! The common contract of every container variant.
//!
//! Call sites written against [`ParticleContainer`] work unchanged with
//! any layout. The variants are [`ParticleStore`] instantiated with a
//! different [`Layout`](crate::layout::Layout) strategy.

use corral_comm::{Distributor, Transport};
use corral_core::{ContainerError, ElementGid, Field, FieldType, Rank, Schema, Timings};

use crate::batch::{ParticleBatch, ParticleSnapshot};
use crate::config::StoreConfig;
use crate::layout::{BlockLayout, CsrLayout, FlatLayout, Layout, TeamLayout};
use crate::metrics::LayoutMetrics;
use crate::space::{DeviceSpace, MemorySpace};
use crate::store::{InvariantViolation, ParticleStore};
use crate::view::{FieldView, SlotMut};

/// Dynamic array of element-tied blocks, sorted within sigma windows.
pub type BlockContainer<S = DeviceSpace> = ParticleStore<BlockLayout, S>;

/// Compressed rows: elements contiguous, blocks may be shared.
pub type CsrContainer<S = DeviceSpace> = ParticleStore<CsrLayout, S>;

/// Flat dense packing without element grouping.
pub type FlatContainer<S = DeviceSpace> = ParticleStore<FlatLayout, S>;

/// Padded teams of `block_width` elements, one lane per element.
pub type TeamContainer<S = DeviceSpace> = ParticleStore<TeamLayout, S>;

/// Operations every container variant provides.
pub trait ParticleContainer: Sized {
    /// Memory space of the storage.
    type Space: MemorySpace;

    /// The same variant in another memory space.
    type Mirror<S2: MemorySpace>: ParticleContainer<Space = S2>;

    /// Build from an initial snapshot.
    fn from_snapshot(config: StoreConfig, snapshot: ParticleSnapshot) -> Result<Self, ContainerError>;

    /// Field schema.
    fn schema(&self) -> &Schema;

    /// Typed view of one field.
    fn get<T: FieldType>(&self, field: Field<T>) -> FieldView<'_, T>;

    /// Visit every slot with `(element, slot, active)`.
    fn parallel_for<F>(&self, f: F)
    where
        F: Fn(usize, usize, bool) + Sync + Send;

    /// Visit every slot with write access.
    fn parallel_for_mut<F>(&mut self, f: F)
    where
        F: Fn(SlotMut<'_>) + Sync + Send;

    /// Reassign or drop particles locally.
    fn rebuild(&mut self, new_element: &[Option<usize>], timings: &mut Timings) -> Result<(), ContainerError>;

    /// Reassign, drop, and insert particles locally.
    fn rebuild_with(
        &mut self,
        new_element: &[Option<usize>],
        arrivals: ParticleBatch,
        timings: &mut Timings,
    ) -> Result<(), ContainerError>;

    /// Collective reassignment across ranks.
    fn migrate<T: Transport + ?Sized>(
        &mut self,
        new_element: &[Option<usize>],
        new_process: &[Rank],
        distributor: Option<&Distributor>,
        transport: &T,
        timings: &mut Timings,
    ) -> Result<(), ContainerError>;

    /// Deep copy into memory space `S2`.
    fn mirror<S2: MemorySpace>(&self) -> Self::Mirror<S2>;

    /// Log and return layout metrics.
    fn report_metrics(&self, timings: &mut Timings) -> Option<LayoutMetrics>;

    /// Check container invariants.
    fn validate(&self) -> Result<(), InvariantViolation>;

    /// Number of elements.
    fn num_elems(&self) -> usize;

    /// Number of active particles.
    fn num_ptcls(&self) -> usize;

    /// Total slots.
    fn capacity(&self) -> usize;

    /// Number of representable element rows.
    fn num_rows(&self) -> usize;

    /// Global id of every element.
    fn element_gids(&self) -> &[ElementGid];

    /// Active particle count per element.
    fn particles_per_element(&self) -> &[usize];
}

impl<L: Layout, S: MemorySpace> ParticleContainer for ParticleStore<L, S> {
    type Space = S;
    type Mirror<S2: MemorySpace> = ParticleStore<L, S2>;

    fn from_snapshot(config: StoreConfig, snapshot: ParticleSnapshot) -> Result<Self, ContainerError> {
        ParticleStore::from_snapshot(config, snapshot)
    }

    fn schema(&self) -> &Schema {
        ParticleStore::schema(self)
    }

    fn get<T: FieldType>(&self, field: Field<T>) -> FieldView<'_, T> {
        ParticleStore::get(self, field)
    }

    fn parallel_for<F>(&self, f: F)
    where
        F: Fn(usize, usize, bool) + Sync + Send,
    {
        ParticleStore::parallel_for(self, f);
    }

    fn parallel_for_mut<F>(&mut self, f: F)
    where
        F: Fn(SlotMut<'_>) + Sync + Send,
    {
        ParticleStore::parallel_for_mut(self, f);
    }

    fn rebuild(&mut self, new_element: &[Option<usize>], timings: &mut Timings) -> Result<(), ContainerError> {
        ParticleStore::rebuild(self, new_element, timings)
    }

    fn rebuild_with(
        &mut self,
        new_element: &[Option<usize>],
        arrivals: ParticleBatch,
        timings: &mut Timings,
    ) -> Result<(), ContainerError> {
        ParticleStore::rebuild_with(self, new_element, arrivals, timings)
    }

    fn migrate<T: Transport + ?Sized>(
        &mut self,
        new_element: &[Option<usize>],
        new_process: &[Rank],
        distributor: Option<&Distributor>,
        transport: &T,
        timings: &mut Timings,
    ) -> Result<(), ContainerError> {
        ParticleStore::migrate(self, new_element, new_process, distributor, transport, timings)
    }

    fn mirror<S2: MemorySpace>(&self) -> Self::Mirror<S2> {
        ParticleStore::mirror::<S2>(self)
    }

    fn report_metrics(&self, timings: &mut Timings) -> Option<LayoutMetrics> {
        ParticleStore::report_metrics(self, timings)
    }

    fn validate(&self) -> Result<(), InvariantViolation> {
        ParticleStore::validate(self)
    }

    fn num_elems(&self) -> usize {
        ParticleStore::num_elems(self)
    }

    fn num_ptcls(&self) -> usize {
        ParticleStore::num_ptcls(self)
    }

    fn capacity(&self) -> usize {
        ParticleStore::capacity(self)
    }

    fn num_rows(&self) -> usize {
        ParticleStore::num_rows(self)
    }

    fn element_gids(&self) -> &[ElementGid] {
        ParticleStore::element_gids(self)
    }

    fn particles_per_element(&self) -> &[usize] {
        ParticleStore::particles_per_element(self)
    }
}
