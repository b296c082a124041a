use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::lander::{FinalizedLander, SampleOutcome};
use crate::series::SlotStatus;

/// Per-outcome sample counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SampleTally {
    pub stored: u64,
    pub merged: u64,
    pub out_of_range: u64,
    pub outside_grid: u64,
    pub missing_channel: u64,
}

impl SampleTally {
    pub fn seen(&self) -> u64 {
        self.stored + self.merged + self.out_of_range + self.outside_grid + self.missing_channel
    }

    pub fn recorded(&self) -> u64 {
        self.stored + self.merged
    }

    pub fn with(mut self, outcome: SampleOutcome) -> Self {
        match outcome {
            SampleOutcome::Stored { .. } => self.stored += 1,
            SampleOutcome::Merged { .. } => self.merged += 1,
            SampleOutcome::OutOfRange { .. } => self.out_of_range += 1,
            SampleOutcome::OutsideGrid => self.outside_grid += 1,
            SampleOutcome::MissingChannel => self.missing_channel += 1,
        }
        self
    }

    pub fn combine(self, other: SampleTally) -> Self {
        Self {
            stored: self.stored + other.stored,
            merged: self.merged + other.merged,
            out_of_range: self.out_of_range + other.out_of_range,
            outside_grid: self.outside_grid + other.outside_grid,
            missing_channel: self.missing_channel + other.missing_channel,
        }
    }
}

/// Lock-free running totals shared by concurrent recorders.
#[derive(Debug, Default)]
pub(crate) struct SampleCounters {
    stored: AtomicU64,
    merged: AtomicU64,
    out_of_range: AtomicU64,
    outside_grid: AtomicU64,
    missing_channel: AtomicU64,
}

impl SampleCounters {
    pub(crate) fn add(&self, tally: &SampleTally) {
        self.stored.fetch_add(tally.stored, Ordering::Relaxed);
        self.merged.fetch_add(tally.merged, Ordering::Relaxed);
        self.out_of_range.fetch_add(tally.out_of_range, Ordering::Relaxed);
        self.outside_grid.fetch_add(tally.outside_grid, Ordering::Relaxed);
        self.missing_channel
            .fetch_add(tally.missing_channel, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SampleTally {
        SampleTally {
            stored: self.stored.load(Ordering::Relaxed),
            merged: self.merged.load(Ordering::Relaxed),
            out_of_range: self.out_of_range.load(Ordering::Relaxed),
            outside_grid: self.outside_grid.load(Ordering::Relaxed),
            missing_channel: self.missing_channel.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregationMetrics {
    pub samples: SampleTally,
    pub cells: usize,
    pub cells_touched: usize,
    pub slots_observed: usize,
    pub slots_interpolated: usize,
    pub slots_unfilled: usize,
}

impl AggregationMetrics {
    pub fn collect(samples: SampleTally, landers: &[FinalizedLander]) -> Self {
        let mut metrics = Self {
            samples,
            cells: landers.len(),
            ..Self::default()
        };
        for lander in landers.iter().filter(|lander| lander.touched) {
            metrics.cells_touched += 1;
            metrics.slots_observed += lander.series.count(SlotStatus::Observed);
            metrics.slots_interpolated += lander.series.count(SlotStatus::Interpolated);
            metrics.slots_unfilled += lander.series.count(SlotStatus::Unfilled);
        }
        metrics
    }
}
