//! Block planning and capacity policy.
//!
//! A [`Layout`] turns per-element particle counts into a [`Plan`]: which
//! element each block belongs to and where the `k`-th particle of an
//! element lands. The strategies share every other part of the
//! container.

use std::cmp::Reverse;

use smallvec::SmallVec;

use crate::config::StoreConfig;

/// Inputs to [`Layout::plan`] beyond the counts.
#[derive(Clone, Copy, Debug)]
pub struct PlanParams {
    /// Slots per block.
    pub width: usize,
    /// Sort window in elements, already clamped to `1..=num_elems`.
    pub sigma: usize,
    /// Blocks one element may emit per round.
    pub vertical_slice: usize,
}

impl PlanParams {
    pub(crate) fn from_config(config: &StoreConfig, num_elems: usize) -> Self {
        Self {
            width: config.block_width,
            sigma: config.sigma_for(num_elems),
            vertical_slice: config.vertical_slice,
        }
    }
}

/// Where particles go, per element.
#[derive(Clone, Debug, PartialEq)]
pub enum Placement {
    /// Each element owns whole blocks, listed in fill order.
    Blocks {
        /// Block indices per element.
        element_chunks: Vec<SmallVec<[u32; 4]>>,
    },
    /// Elements occupy contiguous slot ranges in index order.
    Rows {
        /// Start slot of each element, plus the total as last entry.
        offsets: Vec<usize>,
    },
    /// Each element owns one lane of a team of blocks.
    Teams {
        /// `(first block of the team, lane)` per element.
        element_lanes: Vec<(u32, u32)>,
    },
    /// Particles occupy slots in placement order, ignoring elements.
    Dense,
}

/// The output of layout planning.
#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    /// Element of each block; `None` for spare or mixed blocks.
    pub chunk_elements: Vec<Option<u32>>,
    /// Slot assignment rule.
    pub placement: Placement,
}

impl Plan {
    /// Destination slot of the `rank`-th particle of `element`, which is
    /// the `sequence`-th particle placed overall.
    pub fn slot_for(&self, width: usize, element: usize, rank: usize, sequence: usize) -> usize {
        match &self.placement {
            Placement::Blocks { element_chunks } => {
                element_chunks[element][rank / width] as usize * width + rank % width
            }
            Placement::Rows { offsets } => offsets[element] + rank,
            Placement::Teams { element_lanes } => {
                let (first, lane) = element_lanes[element];
                (first as usize + rank) * width + lane as usize
            }
            Placement::Dense => sequence,
        }
    }
}

/// A physical layout strategy.
pub trait Layout: Send + Sync + 'static {
    /// Display name for logs and metrics.
    const NAME: &'static str;

    /// Blocks needed to hold `counts` without headroom.
    fn required_blocks(counts: &[usize], params: &PlanParams) -> usize;

    /// Plan `blocks` blocks for `counts`. `blocks` is at least
    /// [`required_blocks`](Self::required_blocks).
    fn plan(counts: &[usize], blocks: usize, params: &PlanParams) -> Plan;
}

/// Dynamic array of blocks, each tied to one element.
///
/// Inside each window of `sigma` consecutive elements, elements are
/// ordered by descending count (ties by index). Blocks are then emitted
/// in rounds where every element contributes at most `vertical_slice`
/// consecutive blocks, so one very large element is interleaved with
/// its window instead of forming one long run.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockLayout;

impl Layout for BlockLayout {
    const NAME: &'static str = "block";

    fn required_blocks(counts: &[usize], params: &PlanParams) -> usize {
        counts.iter().map(|c| c.div_ceil(params.width)).sum()
    }

    fn plan(counts: &[usize], blocks: usize, params: &PlanParams) -> Plan {
        let mut chunk_elements = Vec::with_capacity(blocks);
        let mut element_chunks: Vec<SmallVec<[u32; 4]>> = vec![SmallVec::new(); counts.len()];

        let order = sigma_order(counts, params.sigma);
        for window in order.chunks(params.sigma.max(1)) {
            let window: Vec<usize> = window.iter().copied().filter(|&e| counts[e] > 0).collect();
            let mut remaining: Vec<usize> = window
                .iter()
                .map(|&e| counts[e].div_ceil(params.width))
                .collect();

            while remaining.iter().any(|r| *r > 0) {
                for (left, &e) in remaining.iter_mut().zip(&window) {
                    let take = (*left).min(params.vertical_slice);
                    for _ in 0..take {
                        element_chunks[e].push(chunk_elements.len() as u32);
                        chunk_elements.push(Some(e as u32));
                    }
                    *left -= take;
                }
            }
        }

        chunk_elements.resize(blocks.max(chunk_elements.len()), None);
        Plan {
            chunk_elements,
            placement: Placement::Blocks { element_chunks },
        }
    }
}

/// Compressed rows: elements contiguous in index order with no
/// per-element padding. Blocks may hold several elements.
#[derive(Clone, Copy, Debug, Default)]
pub struct CsrLayout;

impl Layout for CsrLayout {
    const NAME: &'static str = "csr";

    fn required_blocks(counts: &[usize], params: &PlanParams) -> usize {
        counts.iter().sum::<usize>().div_ceil(params.width)
    }

    fn plan(counts: &[usize], blocks: usize, _params: &PlanParams) -> Plan {
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        let mut total = 0;
        offsets.push(0);
        for c in counts {
            total += c;
            offsets.push(total);
        }
        Plan {
            chunk_elements: vec![None; blocks],
            placement: Placement::Rows { offsets },
        }
    }
}

/// Flat dense packing in placement order, no grouping by element.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatLayout;

impl Layout for FlatLayout {
    const NAME: &'static str = "flat";

    fn required_blocks(counts: &[usize], params: &PlanParams) -> usize {
        counts.iter().sum::<usize>().div_ceil(params.width)
    }

    fn plan(_counts: &[usize], blocks: usize, _params: &PlanParams) -> Plan {
        Plan {
            chunk_elements: vec![None; blocks],
            placement: Placement::Dense,
        }
    }
}

/// Padded fixed-width teams: after sigma sorting, every `width`
/// consecutive elements form a team, each owning one lane. A team spans
/// as many blocks as its fullest element holds particles, so lanes of
/// shorter elements are padding.
#[derive(Clone, Copy, Debug, Default)]
pub struct TeamLayout;

impl TeamLayout {
    /// Block run length of every team, in team order.
    fn team_lengths<'a>(
        counts: &'a [usize],
        order: &'a [usize],
        width: usize,
    ) -> impl Iterator<Item = usize> + 'a {
        order
            .chunks(width)
            .map(move |team| team.iter().map(|&e| counts[e]).max().unwrap_or(0))
    }
}

impl Layout for TeamLayout {
    const NAME: &'static str = "team";

    fn required_blocks(counts: &[usize], params: &PlanParams) -> usize {
        let order = sigma_order(counts, params.sigma);
        Self::team_lengths(counts, &order, params.width).sum()
    }

    fn plan(counts: &[usize], blocks: usize, params: &PlanParams) -> Plan {
        let order = sigma_order(counts, params.sigma);
        let mut element_lanes = vec![(0u32, 0u32); counts.len()];
        let mut first = 0usize;
        for (team, len) in order
            .chunks(params.width)
            .zip(Self::team_lengths(counts, &order, params.width))
        {
            for (lane, &e) in team.iter().enumerate() {
                element_lanes[e] = (first as u32, lane as u32);
            }
            first += len;
        }
        Plan {
            chunk_elements: vec![None; blocks],
            placement: Placement::Teams { element_lanes },
        }
    }
}

/// Element indices with each window of `sigma` consecutive elements
/// ordered by descending count, ties by index.
fn sigma_order(counts: &[usize], sigma: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..counts.len()).collect();
    for window in order.chunks_mut(sigma.max(1)) {
        window.sort_by_key(|&e| Reverse(counts[e]));
    }
    order
}

/// Blocks to allocate for `required` blocks of data: the data plus
/// `extra_padding` headroom, never less than one spare block.
pub fn capacity_for(required: usize, extra_padding: f64) -> usize {
    let pad = (required as f64 * extra_padding).ceil() as usize;
    required.saturating_add(pad.max(1))
}

/// Block count after a structural change, or `None` to keep the
/// current storage.
///
/// Growth takes the larger of the padded requirement and the current
/// size times `growth_factor`. Shrinking only happens when
/// `min_occupancy` is set and occupancy fell below it.
pub fn resize_target(current: usize, required: usize, config: &StoreConfig) -> Option<usize> {
    if required > current {
        let geometric = (current as f64 * config.growth_factor).ceil() as usize;
        return Some(capacity_for(required, config.extra_padding).max(geometric));
    }
    if config.min_occupancy > 0.0 && current > 0 {
        let occupancy = required as f64 / current as f64;
        let target = capacity_for(required, config.extra_padding);
        if occupancy < config.min_occupancy && target < current {
            return Some(target);
        }
    }
    None
}
