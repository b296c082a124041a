//! Neighbor-based gap filling shared by the ingest and lander sides.
//!
//! A single left-to-right pass over slots `1..len`:
//!
//! - observed and already interpolated slots are left alone;
//! - an unfilled slot whose predecessor is usable becomes the elementwise
//!   mean of that predecessor and the nearest later *observed* slot, or a
//!   copy of the predecessor when no observed slot follows;
//! - an unfilled slot with an unusable predecessor stays at its placeholder.
//!
//! Slot 0 has no predecessor and is never filled here, so a leading gap
//! survives the pass. Callers wanting slot 0 populated seed it first via
//! [`HourlySeries::seed_leading`].

use serde::Serialize;

use crate::series::{HourlySeries, SlotStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GapFillReport {
    /// Slots set to the mean of both neighbors.
    pub interpolated: usize,
    /// Slots copied from their predecessor because no observed slot follows.
    pub carried_forward: usize,
    /// Slots still unfilled after the pass.
    pub unfilled: usize,
}

impl GapFillReport {
    pub fn filled(&self) -> usize {
        self.interpolated + self.carried_forward
    }

    pub(crate) fn with_unfilled(mut self, unfilled: usize) -> Self {
        self.unfilled = unfilled;
        self
    }
}

pub fn fill_gaps(series: &mut HourlySeries) -> GapFillReport {
    let mut report = GapFillReport::default();

    for i in 1..series.len() {
        let slots = series.slots();
        if slots[i].status().is_usable() || !slots[i - 1].status().is_usable() {
            continue;
        }

        let previous = slots[i - 1].values();
        let next_observed = slots[i + 1..]
            .iter()
            .find(|slot| slot.status() == SlotStatus::Observed);

        let filled = match next_observed {
            Some(next) => {
                report.interpolated += 1;
                previous
                    .iter()
                    .zip(next.values())
                    .map(|(a, b)| (a + b) / 2.0)
                    .collect()
            }
            None => {
                report.carried_forward += 1;
                previous.to_vec()
            }
        };

        if let Some(slot) = series.slot_mut(i) {
            slot.fill(filled);
        }
    }

    report.unfilled = series.count(SlotStatus::Unfilled);
    report
}
