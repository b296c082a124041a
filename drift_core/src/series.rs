use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::gap_fill::{self, GapFillReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Unfilled,
    Observed,
    Interpolated,
}

impl SlotStatus {
    /// Whether the slot can anchor interpolation of its successor.
    pub fn is_usable(self) -> bool {
        matches!(self, SlotStatus::Observed | SlotStatus::Interpolated)
    }
}

/// Truncates a timestamp down to the start of its hour.
pub fn truncate_to_hour(time: DateTime<Utc>) -> DateTime<Utc> {
    time.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// One hour bucket.
///
/// `values` holds the placeholder until the slot is observed or
/// interpolated. Ingest accumulates into `sums`/`counts` and only writes
/// `values` when the owning series settles its averages; lander updates write
/// `values` directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourSlot {
    hour: DateTime<Utc>,
    values: Vec<f64>,
    status: SlotStatus,
    samples: u32,
    #[serde(skip)]
    sums: Vec<f64>,
    #[serde(skip)]
    counts: Vec<u32>,
}

impl HourSlot {
    fn new(hour: DateTime<Utc>, placeholders: &[f64]) -> Self {
        Self {
            hour,
            values: placeholders.to_vec(),
            status: SlotStatus::Unfilled,
            samples: 0,
            sums: vec![0.0; placeholders.len()],
            counts: vec![0; placeholders.len()],
        }
    }

    pub fn hour(&self) -> DateTime<Utc> {
        self.hour
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(&self, channel: usize) -> Option<f64> {
        self.values.get(channel).copied()
    }

    pub fn status(&self) -> SlotStatus {
        self.status
    }

    /// Number of raw readings or samples that landed in this hour.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn is_touched(&self) -> bool {
        self.samples > 0
    }

    pub(crate) fn accumulate(&mut self, values: &[Option<f64>]) {
        for ((sum, count), value) in self.sums.iter_mut().zip(&mut self.counts).zip(values) {
            if let Some(v) = value {
                *sum += v;
                *count += 1;
            }
        }
        self.samples += 1;
    }

    /// Divides the accumulated sums by their counts. Channels that never
    /// contributed keep their placeholder.
    pub(crate) fn settle(&mut self) -> bool {
        if self.status != SlotStatus::Unfilled || self.samples == 0 {
            return false;
        }
        for channel in 0..self.values.len() {
            if self.counts[channel] > 0 {
                self.values[channel] = self.sums[channel] / self.counts[channel] as f64;
            }
        }
        self.status = SlotStatus::Observed;
        true
    }

    /// Writes the first sample of an hour. Values beyond the slot's channel
    /// count are ignored.
    pub(crate) fn store(&mut self, values: &[Option<f64>]) {
        for ((stored, count), value) in self.values.iter_mut().zip(&mut self.counts).zip(values) {
            if let Some(v) = value {
                *stored = *v;
                *count = 1;
            }
        }
        self.samples = 1;
        self.status = SlotStatus::Observed;
    }

    /// Folds a further sample into an already observed hour. `combine` gets
    /// the stored value, the new value and the channel's contribution count
    /// including the new sample.
    pub(crate) fn merge(&mut self, values: &[Option<f64>], combine: impl Fn(f64, f64, u32) -> f64) {
        for ((stored, count), value) in self.values.iter_mut().zip(&mut self.counts).zip(values) {
            if let Some(v) = value {
                *count += 1;
                *stored = if *count == 1 {
                    *v
                } else {
                    combine(*stored, *v, *count)
                };
            }
        }
        self.samples += 1;
    }

    pub(crate) fn fill(&mut self, values: Vec<f64>) {
        self.values = values;
        self.status = SlotStatus::Interpolated;
    }
}

/// Fixed-length hourly series: slot `i` covers `[start + i h, start + (i+1) h)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlySeries {
    start: DateTime<Utc>,
    slots: Vec<HourSlot>,
    #[serde(skip)]
    finalized: bool,
}

impl HourlySeries {
    pub fn new(start: DateTime<Utc>, length_hours: usize, placeholders: &[f64]) -> Self {
        let slots = (0..length_hours)
            .map(|i| HourSlot::new(start + Duration::hours(i as i64), placeholders))
            .collect();
        Self {
            start,
            slots,
            finalized: false,
        }
    }

    /// Detaches the slots so they can be guarded individually.
    pub(crate) fn into_slots(self) -> (DateTime<Utc>, Vec<HourSlot>) {
        (self.start, self.slots)
    }

    pub(crate) fn from_slots(start: DateTime<Utc>, slots: Vec<HourSlot>) -> Self {
        Self {
            start,
            slots,
            finalized: false,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::hours(self.slots.len() as i64)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[HourSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&HourSlot> {
        self.slots.get(index)
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> Option<&mut HourSlot> {
        self.slots.get_mut(index)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Slot index for `time`, i.e. `floor((time - start) / 1h)`, when it lies
    /// inside the series window.
    pub fn offset_of(&self, time: DateTime<Utc>) -> Option<usize> {
        hour_offset(self.start, self.slots.len(), time)
    }

    pub fn count(&self, status: SlotStatus) -> usize {
        self.slots.iter().filter(|slot| slot.status == status).count()
    }

    /// Value of `channel` in the hour containing `time`.
    pub fn value_at(&self, time: DateTime<Utc>, channel: usize) -> Option<f64> {
        self.offset_of(time)
            .and_then(|index| self.slots[index].value(channel))
    }

    pub(crate) fn accumulate(&mut self, index: usize, values: &[Option<f64>]) {
        self.slots[index].accumulate(values);
    }

    /// Turns accumulated sums into averages. Returns how many slots became
    /// observed.
    pub fn settle_averages(&mut self) -> usize {
        self.slots
            .iter_mut()
            .map(HourSlot::settle)
            .filter(|settled| *settled)
            .count()
    }

    /// Gives slot 0 an explicit value when nothing ever landed there; the gap
    /// filler never reaches it otherwise. The seed is not a real sample, so
    /// the slot becomes interpolated rather than observed.
    pub fn seed_leading(&mut self, values: &[f64]) -> bool {
        match self.slots.first_mut() {
            Some(slot) if slot.samples == 0 && slot.status == SlotStatus::Unfilled => {
                slot.values = values.to_vec();
                slot.status = SlotStatus::Interpolated;
                true
            }
            _ => false,
        }
    }

    /// Settles averages and gap-fills. Only the first call mutates the series.
    pub fn finalize(&mut self) -> GapFillReport {
        if self.finalized {
            return GapFillReport::default().with_unfilled(self.count(SlotStatus::Unfilled));
        }
        self.settle_averages();
        let report = gap_fill::fill_gaps(self);
        self.finalized = true;
        report
    }
}

pub(crate) fn hour_offset(
    start: DateTime<Utc>,
    length_hours: usize,
    time: DateTime<Utc>,
) -> Option<usize> {
    let delta = time - start;
    if delta < Duration::zero() {
        return None;
    }
    let offset = delta.num_hours() as usize;
    (offset < length_hours).then_some(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 4, 12, hour, minute, 0).unwrap()
    }

    #[test]
    fn truncation_drops_sub_hour_components() {
        let time = Utc.with_ymd_and_hms(2023, 4, 12, 10, 59, 59).unwrap()
            + Duration::milliseconds(999);
        assert_eq!(truncate_to_hour(time), at(10, 0));
        assert_eq!(truncate_to_hour(at(10, 0)), at(10, 0));
    }

    #[test]
    fn offsets_cover_half_open_window() {
        let series = HourlySeries::new(at(10, 0), 3, &[0.0]);
        assert_eq!(series.offset_of(at(10, 0)), Some(0));
        assert_eq!(series.offset_of(at(10, 59)), Some(0));
        assert_eq!(series.offset_of(at(12, 59)), Some(2));
        assert_eq!(series.offset_of(at(13, 0)), None);
        assert_eq!(series.offset_of(at(9, 59)), None);
        assert_eq!(
            series.offset_of(at(10, 0) - Duration::milliseconds(1)),
            None,
            "sub-second negative offsets must not round into slot 0"
        );
        assert_eq!(series.end(), at(13, 0));
    }

    #[test]
    fn slots_start_at_placeholder_and_hour_aligned() {
        let series = HourlySeries::new(at(10, 0), 4, &[20.0, 8.0]);
        assert_eq!(series.len(), 4);
        for (i, slot) in series.slots().iter().enumerate() {
            assert_eq!(slot.hour(), at(10 + i as u32, 0));
            assert_eq!(slot.values(), &[20.0, 8.0]);
            assert_eq!(slot.status(), SlotStatus::Unfilled);
        }
    }

    #[test]
    fn settle_averages_per_channel() {
        let mut series = HourlySeries::new(at(10, 0), 2, &[20.0, 8.0]);
        series.accumulate(0, &[Some(1.0), Some(10.0)]);
        series.accumulate(0, &[Some(3.0), None]);
        assert_eq!(series.settle_averages(), 1);

        let slot = series.slot(0).unwrap();
        assert_eq!(slot.status(), SlotStatus::Observed);
        assert_eq!(slot.samples(), 2);
        assert_eq!(slot.values(), &[2.0, 10.0]);
        assert_eq!(series.slot(1).unwrap().status(), SlotStatus::Unfilled);
    }

    #[test]
    fn settle_reports_only_newly_observed_slots() {
        let mut series = HourlySeries::new(at(10, 0), 3, &[0.0]);
        series.accumulate(0, &[Some(1.0)]);
        series.accumulate(2, &[Some(3.0)]);
        assert_eq!(series.settle_averages(), 2);
        assert_eq!(series.settle_averages(), 0);
        assert_eq!(series.count(SlotStatus::Observed), 2);
    }

    #[test]
    fn extra_channel_values_are_ignored() {
        let mut series = HourlySeries::new(at(10, 0), 1, &[20.0]);
        let slot = series.slot_mut(0).unwrap();
        slot.store(&[Some(1.0), Some(99.0)]);
        slot.merge(&[Some(3.0), Some(99.0), None], |a, b, _| (a + b) / 2.0);
        slot.accumulate(&[Some(5.0), Some(99.0)]);
        assert_eq!(slot.values(), &[2.0]);
        assert_eq!(slot.samples(), 3);
    }

    #[test]
    fn seed_leading_only_touches_empty_first_slot() {
        let mut series = HourlySeries::new(at(10, 0), 2, &[0.0]);
        assert!(series.seed_leading(&[5.0]));
        assert_eq!(series.slot(0).unwrap().values(), &[5.0]);
        assert_eq!(series.slot(0).unwrap().status(), SlotStatus::Interpolated);
        assert_eq!(series.count(SlotStatus::Observed), 0);
        assert!(!series.seed_leading(&[6.0]));

        let mut observed = HourlySeries::new(at(10, 0), 2, &[0.0]);
        observed.accumulate(0, &[Some(1.0)]);
        assert!(!observed.seed_leading(&[5.0]));
    }

    #[test]
    fn finalize_runs_once() {
        let mut series = HourlySeries::new(at(10, 0), 3, &[0.0]);
        series.accumulate(0, &[Some(4.0)]);
        let first = series.finalize();
        assert_eq!(first.carried_forward, 2);
        let snapshot = series.clone();

        series.accumulate(1, &[Some(100.0)]);
        let second = series.finalize();
        assert_eq!(second.interpolated, 0);
        assert_eq!(series.slot(1).unwrap().values(), snapshot.slot(1).unwrap().values());
    }

    #[test]
    fn value_at_reads_containing_hour() {
        let mut series = HourlySeries::new(at(10, 0), 2, &[0.0, 0.0]);
        series.accumulate(1, &[Some(2.0), Some(3.0)]);
        series.settle_averages();
        assert_eq!(series.value_at(at(11, 30), 1), Some(3.0));
        assert_eq!(series.value_at(at(12, 0), 1), None);
        assert_eq!(series.value_at(at(11, 30), 2), None);
    }
}
