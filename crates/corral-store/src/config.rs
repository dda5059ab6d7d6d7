//! Container configuration and its validation.

use corral_core::{ConstructionError, Rank};

/// Tuning and identity for one particle container.
///
/// Every field has a working default; `validate()` runs during
/// construction and rejects out-of-range values before any storage is
/// allocated.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreConfig {
    /// Name used in logs and checkpoints.
    pub name: String,
    /// Rank of the owning process. Migration checks it against the
    /// transport.
    pub rank: Rank,
    /// Slots per block.
    pub block_width: usize,
    /// Sort window in elements. `None` sorts all elements together,
    /// `Some(1)` keeps index order.
    pub sigma: Option<usize>,
    /// Maximum consecutive blocks one element emits per round inside a
    /// sort window.
    pub vertical_slice: usize,
    /// Headroom as a fraction of required blocks.
    pub extra_padding: f64,
    /// Minimum growth ratio when capacity must increase.
    pub growth_factor: f64,
    /// Reallocate smaller when occupancy drops below this fraction.
    /// `0.0` never shrinks.
    pub min_occupancy: f64,
    /// Hard ceiling on capacity, in slots.
    pub max_capacity: Option<usize>,
    /// Join a barrier before migrate and checkpoint so per-rank timings
    /// line up. The wait is recorded separately.
    pub prebarrier: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "corral".to_string(),
            rank: Rank(0),
            block_width: 32,
            sigma: None,
            vertical_slice: 1024,
            extra_padding: 0.05,
            growth_factor: 1.5,
            min_occupancy: 0.0,
            max_capacity: None,
            prebarrier: false,
        }
    }
}

impl StoreConfig {
    /// Config for `rank` with all other settings at their defaults.
    pub fn for_rank(rank: Rank) -> Self {
        Self {
            rank,
            ..Self::default()
        }
    }

    /// Check every setting is in range.
    pub fn validate(&self) -> Result<(), ConstructionError> {
        let invalid = |reason: String| Err(ConstructionError::InvalidConfig { reason });
        if self.block_width == 0 {
            return invalid("block_width must be at least 1".into());
        }
        if self.sigma == Some(0) {
            return invalid("sigma must be at least 1".into());
        }
        if self.vertical_slice == 0 {
            return invalid("vertical_slice must be at least 1".into());
        }
        if !self.extra_padding.is_finite() || self.extra_padding < 0.0 {
            return invalid(format!(
                "extra_padding must be finite and non-negative, got {}",
                self.extra_padding
            ));
        }
        if !self.growth_factor.is_finite() || self.growth_factor < 1.0 {
            return invalid(format!(
                "growth_factor must be finite and at least 1, got {}",
                self.growth_factor
            ));
        }
        if !(0.0..1.0).contains(&self.min_occupancy) {
            return invalid(format!(
                "min_occupancy must be in [0, 1), got {}",
                self.min_occupancy
            ));
        }
        if let Some(max) = self.max_capacity {
            if max < self.block_width {
                return invalid(format!(
                    "max_capacity {max} is smaller than one block of {}",
                    self.block_width
                ));
            }
        }
        Ok(())
    }

    /// Sort window resolved against the element count.
    pub(crate) fn sigma_for(&self, num_elems: usize) -> usize {
        self.sigma.unwrap_or(num_elems).clamp(1, num_elems.max(1))
    }
}
