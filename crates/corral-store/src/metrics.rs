//! Layout diagnostics.

use std::panic::{self, AssertUnwindSafe};

use corral_core::Timings;

use crate::layout::Layout;
use crate::space::MemorySpace;
use crate::store::ParticleStore;

/// Occupancy and balance summary of a container's storage.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutMetrics {
    /// Layout strategy name.
    pub layout: &'static str,
    /// Memory space name.
    pub space: &'static str,
    /// Number of local elements.
    pub num_elems: usize,
    /// Number of active particles.
    pub num_ptcls: usize,
    /// Total slots.
    pub capacity: usize,
    /// Allocated blocks.
    pub num_blocks: usize,
    /// Blocks holding no active slot.
    pub empty_blocks: usize,
    /// Inactive slots.
    pub padding_slots: usize,
    /// Active fraction of all slots.
    pub occupancy: f64,
    /// Elements with no particles.
    pub empty_elements: usize,
    /// Largest per-element count.
    pub max_per_element: usize,
    /// Mean per-element count.
    pub mean_per_element: f64,
    /// `max / mean` over elements; 1.0 is perfectly even.
    pub imbalance: f64,
}

impl<L: Layout, S: MemorySpace> ParticleStore<L, S> {
    /// Compute layout metrics.
    pub fn layout_metrics(&self) -> LayoutMetrics {
        let capacity = self.capacity();
        let num_elems = self.num_elems();
        let max_per_element = self.counts.iter().copied().max().unwrap_or(0);
        let mean_per_element = if num_elems == 0 {
            0.0
        } else {
            self.num_ptcls as f64 / num_elems as f64
        };
        LayoutMetrics {
            layout: L::NAME,
            space: S::NAME,
            num_elems,
            num_ptcls: self.num_ptcls,
            capacity,
            num_blocks: self.chunks.len(),
            empty_blocks: self.chunks.iter().filter(|c| c.active_lanes() == 0).count(),
            padding_slots: capacity - self.num_ptcls,
            occupancy: if capacity == 0 {
                0.0
            } else {
                self.num_ptcls as f64 / capacity as f64
            },
            empty_elements: self.counts.iter().filter(|c| **c == 0).count(),
            max_per_element,
            mean_per_element,
            imbalance: if mean_per_element > 0.0 {
                max_per_element as f64 / mean_per_element
            } else {
                1.0
            },
        }
    }

    /// Log layout metrics and return them.
    ///
    /// Diagnostics never abort the caller: a panic while computing the
    /// report is caught, counted in `timings`, and yields `None`.
    pub fn report_metrics(&self, timings: &mut Timings) -> Option<LayoutMetrics> {
        self.report_with(timings, Self::layout_metrics)
    }

    fn report_with<F>(&self, timings: &mut Timings, compute: F) -> Option<LayoutMetrics>
    where
        F: FnOnce(&Self) -> LayoutMetrics,
    {
        match panic::catch_unwind(AssertUnwindSafe(|| compute(self))) {
            Ok(m) => {
                tracing::info!(
                    name = %self.config.name,
                    rank = self.config.rank.index(),
                    layout = m.layout,
                    space = m.space,
                    num_elems = m.num_elems,
                    num_ptcls = m.num_ptcls,
                    capacity = m.capacity,
                    padding_slots = m.padding_slots,
                    empty_blocks = m.empty_blocks,
                    occupancy = m.occupancy,
                    imbalance = m.imbalance,
                    "layout metrics"
                );
                Some(m)
            }
            Err(_) => {
                tracing::warn!(
                    name = %self.config.name,
                    rank = self.config.rank.index(),
                    "metrics report failed"
                );
                timings.note_metric_failure();
                None
            }
        }
    }
}
