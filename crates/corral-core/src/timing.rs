//! Explicit timing collector for structural operations.
//!
//! [`Timings`] replaces a process-wide registry: callers create one,
//! pass it by `&mut` into rebuild/migrate/metrics calls, and
//! [`flush`](Timings::flush) it when they want a summary.

use std::time::Duration;

use indexmap::IndexMap;

/// Accumulated timing for one named region.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimingEntry {
    /// Number of recorded calls.
    pub calls: u64,
    /// Total wall-clock time inside the region.
    pub total: Duration,
    /// Longest single call.
    pub max: Duration,
    /// Total time spent waiting in the optional pre-operation barrier.
    pub prebarrier: Duration,
}

/// Collector of per-region timings and diagnostic failure counts.
///
/// Entries keep first-recorded order so flushed summaries are stable.
#[derive(Clone, Debug, Default)]
pub struct Timings {
    entries: IndexMap<String, TimingEntry>,
    metric_failures: u64,
}

impl Timings {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call of `region`.
    pub fn record(&mut self, region: &str, elapsed: Duration, prebarrier: Duration) {
        let entry = self.entries.entry(region.to_string()).or_default();
        entry.calls += 1;
        entry.total += elapsed;
        entry.prebarrier += prebarrier;
        entry.max = entry.max.max(elapsed);
    }

    /// Accumulated entry for `region`, if any call was recorded.
    pub fn get(&self, region: &str) -> Option<&TimingEntry> {
        self.entries.get(region)
    }

    /// All entries in first-recorded order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TimingEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Count a diagnostic that failed and was swallowed.
    pub fn note_metric_failure(&mut self) {
        self.metric_failures += 1;
    }

    /// Number of swallowed diagnostic failures since the last flush.
    pub fn metric_failures(&self) -> u64 {
        self.metric_failures
    }

    /// Log a summary of every region, then reset the collector.
    ///
    /// Returns the drained entries.
    pub fn flush(&mut self) -> Vec<(String, TimingEntry)> {
        for (region, e) in &self.entries {
            tracing::info!(
                region = region.as_str(),
                calls = e.calls,
                total_us = e.total.as_micros() as u64,
                max_us = e.max.as_micros() as u64,
                prebarrier_us = e.prebarrier.as_micros() as u64,
                "timing"
            );
        }
        if self.metric_failures > 0 {
            tracing::warn!(failures = self.metric_failures, "metrics reports failed");
        }
        self.metric_failures = 0;
        self.entries.drain(..).collect()
    }
}
