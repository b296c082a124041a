//! Lander side: per-cell hourly accumulation of simulation samples.
//!
//! A [`LanderGrid`] is the run-scoped owner of the spatial grid and of one
//! [`LanderSeries`] per cell. Recording takes `&self`: every hour slot sits
//! behind its own lock, so samples for different `(cell, hour)` pairs never
//! contend, while two samples for the same pair merge one after the other.
//! Finalizing consumes the grid, which rules out a late update landing on an
//! already gap-filled slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use drift_schema::ParticleSample;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::channels::ChannelSet;
use crate::gap_fill::GapFillReport;
use crate::grid::{SpatialCell, SpatialGrid, FIRST_CELL_ID};
use crate::issues::AggregationIssue;
use crate::metrics::{AggregationMetrics, SampleCounters, SampleTally};
use crate::series::{hour_offset, HourSlot, HourlySeries};

/// How a further sample for an already observed hour is folded in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// `stored = (stored + new) / 2`. Order dependent: later samples weigh
    /// more than earlier ones.
    #[default]
    PairwiseAverage,
    /// Arithmetic mean of every sample seen for the hour.
    RunningMean,
}

impl MergePolicy {
    /// `count` includes the incoming sample.
    pub fn combine(self, stored: f64, incoming: f64, count: u32) -> f64 {
        match self {
            MergePolicy::PairwiseAverage => (stored + incoming) / 2.0,
            MergePolicy::RunningMean => stored + (incoming - stored) / count as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Stored { hour: usize },
    Merged { hour: usize },
    OutOfRange,
}

pub struct LanderSeries {
    cell: SpatialCell,
    start: DateTime<Utc>,
    slots: Vec<Mutex<HourSlot>>,
    policy: MergePolicy,
    touched: AtomicBool,
}

impl LanderSeries {
    pub fn new(
        cell: SpatialCell,
        start: DateTime<Utc>,
        length_hours: usize,
        placeholders: &[f64],
        policy: MergePolicy,
    ) -> Self {
        let (start, slots) = HourlySeries::new(start, length_hours, placeholders).into_slots();
        Self {
            cell,
            start,
            slots: slots.into_iter().map(Mutex::new).collect(),
            policy,
            touched: AtomicBool::new(false),
        }
    }

    pub fn cell(&self) -> &SpatialCell {
        &self.cell
    }

    pub fn id(&self) -> u32 {
        self.cell.id
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    pub fn is_touched(&self) -> bool {
        self.touched.load(Ordering::Acquire)
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.cell.contains(lat, lon)
    }

    /// Copy of one slot as it currently stands.
    pub fn slot(&self, index: usize) -> Option<HourSlot> {
        self.slots.get(index).map(|slot| slot.lock().clone())
    }

    /// Places `values` in hour `floor((simulated_time - start) / 1h)`. The
    /// first sample of an hour is stored as-is; later ones are merged with
    /// the stored values according to the series' [`MergePolicy`]. Optional
    /// channels given as `None` are left untouched, and values past the
    /// series' channel count are ignored.
    pub fn update(&self, values: &[Option<f64>], simulated_time: DateTime<Utc>) -> UpdateOutcome {
        let Some(hour) = hour_offset(self.start, self.slots.len(), simulated_time) else {
            return UpdateOutcome::OutOfRange;
        };

        let outcome = {
            let mut slot = self.slots[hour].lock();
            if slot.is_touched() {
                let policy = self.policy;
                slot.merge(values, |stored, incoming, count| {
                    policy.combine(stored, incoming, count)
                });
                UpdateOutcome::Merged { hour }
            } else {
                slot.store(values);
                UpdateOutcome::Stored { hour }
            }
        };
        self.touched.store(true, Ordering::Release);
        outcome
    }

    /// Unwraps the slots and gap-fills them. `seed` populates an empty first
    /// hour beforehand.
    pub fn finalize(self, seed: Option<&[f64]>) -> FinalizedLander {
        let touched = self.touched.into_inner();
        let slots = self.slots.into_iter().map(Mutex::into_inner).collect();
        let mut series = HourlySeries::from_slots(self.start, slots);
        if let Some(values) = seed {
            series.seed_leading(values);
        }
        let gap_fill = series.finalize();
        FinalizedLander {
            cell: self.cell,
            touched,
            series,
            gap_fill,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizedLander {
    pub cell: SpatialCell,
    pub touched: bool,
    pub series: HourlySeries,
    pub gap_fill: GapFillReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    Stored { cell: u32, hour: usize },
    Merged { cell: u32, hour: usize },
    OutOfRange { cell: u32 },
    OutsideGrid,
    MissingChannel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizeOptions {
    /// Seed an empty first hour of touched landers with the channel
    /// placeholders so the gap filler can carry from it.
    pub seed_leading_slot: bool,
}

/// Run-scoped context owning the grid and every lander series.
pub struct LanderGrid {
    grid: SpatialGrid,
    channels: Arc<ChannelSet>,
    landers: Vec<LanderSeries>,
    start: DateTime<Utc>,
    length_hours: usize,
    counters: SampleCounters,
}

impl LanderGrid {
    pub fn new(
        grid: SpatialGrid,
        channels: Arc<ChannelSet>,
        start: DateTime<Utc>,
        length_hours: usize,
        policy: MergePolicy,
    ) -> Self {
        let placeholders = channels.placeholders();
        let landers = grid
            .cells()
            .iter()
            .map(|cell| LanderSeries::new(*cell, start, length_hours, &placeholders, policy))
            .collect::<Vec<_>>();

        tracing::info!(
            target: "drift::lander",
            landers = landers.len(),
            length_hours,
            channel_set = channels.name(),
            ?policy,
            "landers.created"
        );

        Self {
            grid,
            channels,
            landers,
            start,
            length_hours,
            counters: SampleCounters::default(),
        }
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn landers(&self) -> &[LanderSeries] {
        &self.landers
    }

    pub fn lander(&self, id: u32) -> Option<&LanderSeries> {
        let index = id.checked_sub(FIRST_CELL_ID)? as usize;
        self.landers.get(index)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn length_hours(&self) -> usize {
        self.length_hours
    }

    pub fn tally(&self) -> SampleTally {
        self.counters.snapshot()
    }

    pub fn record(&self, sample: &ParticleSample) -> SampleOutcome {
        let outcome = self.place(sample);
        self.counters.add(&SampleTally::default().with(outcome));
        outcome
    }

    /// Records a batch in parallel and returns the tally for this batch.
    pub fn record_batch(&self, samples: &[ParticleSample]) -> SampleTally {
        let tally = samples
            .par_iter()
            .fold(SampleTally::default, |tally, sample| {
                tally.with(self.place(sample))
            })
            .reduce(SampleTally::default, SampleTally::combine);
        self.counters.add(&tally);
        tracing::trace!(
            target: "drift::lander",
            samples = samples.len(),
            recorded = tally.recorded(),
            "batch.recorded"
        );
        tally
    }

    fn place(&self, sample: &ParticleSample) -> SampleOutcome {
        let values = match self.channels.resolve(&sample.values) {
            Ok(values) => values,
            Err(err) => {
                tracing::debug!(target: "drift::lander", error = %err, "sample.rejected=missing_channel");
                return SampleOutcome::MissingChannel;
            }
        };
        let Some(index) = self.grid.locate_index(sample.lat, sample.lon) else {
            return SampleOutcome::OutsideGrid;
        };
        let lander = &self.landers[index];
        match lander.update(&values, sample.simulated_time) {
            UpdateOutcome::Stored { hour } => SampleOutcome::Stored {
                cell: lander.id(),
                hour,
            },
            UpdateOutcome::Merged { hour } => SampleOutcome::Merged {
                cell: lander.id(),
                hour,
            },
            UpdateOutcome::OutOfRange => {
                let issue = AggregationIssue::OutOfRangeSample {
                    time: sample.simulated_time,
                    start: self.start,
                    length_hours: self.length_hours,
                };
                tracing::trace!(target: "drift::lander", cell = lander.id(), issue = %issue, "sample.rejected=out_of_range");
                SampleOutcome::OutOfRange { cell: lander.id() }
            }
        }
    }

    pub fn finalize(self, options: FinalizeOptions) -> FinalizedRun {
        let placeholders = self.channels.placeholders();
        let landers: Vec<FinalizedLander> = self
            .landers
            .into_par_iter()
            .map(|lander| {
                let seed = (options.seed_leading_slot && lander.is_touched())
                    .then_some(placeholders.as_slice());
                lander.finalize(seed)
            })
            .collect();

        let issues: Vec<AggregationIssue> = landers
            .iter()
            .filter(|lander| lander.touched && lander.gap_fill.unfilled > 0)
            .map(|lander| AggregationIssue::MissingData {
                series: format!("lander {}", lander.cell.id),
                unfilled: lander.gap_fill.unfilled,
                length: lander.series.len(),
            })
            .collect();

        let metrics = AggregationMetrics::collect(self.counters.snapshot(), &landers);
        tracing::info!(
            target: "drift::lander",
            cells = metrics.cells,
            cells_touched = metrics.cells_touched,
            samples_seen = metrics.samples.seen(),
            samples_recorded = metrics.samples.recorded(),
            slots_interpolated = metrics.slots_interpolated,
            slots_unfilled = metrics.slots_unfilled,
            "landers.finalized"
        );
        for issue in &issues {
            tracing::debug!(target: "drift::lander", issue = %issue, "lander.missing_data");
        }

        FinalizedRun {
            channels: self.channels,
            landers,
            metrics,
            issues,
        }
    }
}

/// Every lander of a run after gap filling; immutable from here on.
#[derive(Debug, Clone)]
pub struct FinalizedRun {
    pub channels: Arc<ChannelSet>,
    pub landers: Vec<FinalizedLander>,
    pub metrics: AggregationMetrics,
    pub issues: Vec<AggregationIssue>,
}

impl FinalizedRun {
    pub fn lander(&self, id: u32) -> Option<&FinalizedLander> {
        self.landers.iter().find(|lander| lander.cell.id == id)
    }

    pub fn touched(&self) -> impl Iterator<Item = &FinalizedLander> {
        self.landers.iter().filter(|lander| lander.touched)
    }
}
