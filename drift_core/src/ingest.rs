//! Ingest side: raw sensor readings into hourly series per spatial key.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use drift_schema::{Reading, SpatialKey};
use serde::Serialize;

use crate::channels::ChannelSet;
use crate::gap_fill::GapFillReport;
use crate::issues::AggregationIssue;
use crate::series::{truncate_to_hour, HourlySeries};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub accepted: usize,
    pub out_of_range: usize,
    pub foreign_key: usize,
    pub missing_channel: usize,
}

impl IngestStats {
    pub fn rejected(&self) -> usize {
        self.out_of_range + self.foreign_key + self.missing_channel
    }

    fn absorb(&mut self, other: IngestStats) {
        self.accepted += other.accepted;
        self.out_of_range += other.out_of_range;
        self.foreign_key += other.foreign_key;
        self.missing_channel += other.missing_channel;
    }
}

/// Buckets the readings of one spatial key and one channel set into a
/// pre-allocated hourly series.
#[derive(Debug)]
pub struct HourBucketAggregator {
    key: SpatialKey,
    channels: Arc<ChannelSet>,
    series: HourlySeries,
    stats: IngestStats,
}

impl HourBucketAggregator {
    /// `start` is truncated down to its hour.
    pub fn new(
        key: SpatialKey,
        channels: Arc<ChannelSet>,
        start: DateTime<Utc>,
        length_hours: usize,
    ) -> Self {
        let series = HourlySeries::new(
            truncate_to_hour(start),
            length_hours,
            &channels.placeholders(),
        );
        Self {
            key,
            channels,
            series,
            stats: IngestStats::default(),
        }
    }

    pub fn key(&self) -> &SpatialKey {
        &self.key
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn series(&self) -> &HourlySeries {
        &self.series
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Accumulates readings into their hour slots and returns the counts for
    /// this call. Readings outside the window, for another key, or missing a
    /// required channel are skipped.
    pub fn ingest<'a, I>(&mut self, readings: I) -> IngestStats
    where
        I: IntoIterator<Item = &'a Reading>,
    {
        let mut stats = IngestStats::default();
        for reading in readings {
            if reading.key != self.key {
                stats.foreign_key += 1;
                continue;
            }
            let Some(index) = self.series.offset_of(reading.timestamp) else {
                let issue = AggregationIssue::OutOfRangeSample {
                    time: reading.timestamp,
                    start: self.series.start(),
                    length_hours: self.series.len(),
                };
                tracing::trace!(
                    target: "drift::ingest",
                    key = %self.key,
                    issue = %issue,
                    "reading.rejected=out_of_range"
                );
                stats.out_of_range += 1;
                continue;
            };
            match self.channels.resolve(&reading.values) {
                Ok(values) => {
                    self.series.accumulate(index, &values);
                    stats.accepted += 1;
                }
                Err(err) => {
                    tracing::debug!(
                        target: "drift::ingest",
                        key = %self.key,
                        error = %err,
                        "reading.rejected=missing_channel"
                    );
                    stats.missing_channel += 1;
                }
            }
        }
        self.stats.absorb(stats);
        stats
    }

    /// Averages every touched hour, optionally seeds an empty first hour with
    /// the channel placeholders, then gap-fills.
    pub fn finalize(mut self, seed_leading_slot: bool) -> AggregatedSeries {
        let observed_hours = self
            .series
            .slots()
            .iter()
            .filter(|slot| slot.is_touched())
            .count();
        if seed_leading_slot {
            self.series.seed_leading(&self.channels.placeholders());
        }
        let gap_fill = self.series.finalize();

        tracing::debug!(
            target: "drift::ingest",
            key = %self.key,
            channel_set = self.channels.name(),
            accepted = self.stats.accepted,
            rejected = self.stats.rejected(),
            observed_hours,
            interpolated = gap_fill.filled(),
            unfilled = gap_fill.unfilled,
            "series.finalized"
        );

        AggregatedSeries {
            key: self.key,
            channel_set: self.channels.name().to_string(),
            channels: self.channels.names().map(str::to_string).collect(),
            series: self.series,
            stats: self.stats,
            observed_hours,
            gap_fill,
        }
    }
}

/// A finalized ingest series ready to be handed to the drift engine.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedSeries {
    pub key: SpatialKey,
    pub channel_set: String,
    pub channels: Vec<String>,
    pub series: HourlySeries,
    pub stats: IngestStats,
    /// Hours that received at least one reading.
    pub observed_hours: usize,
    pub gap_fill: GapFillReport,
}

impl AggregatedSeries {
    pub fn channel_index(&self, channel: &str) -> Option<usize> {
        self.channels.iter().position(|name| name == channel)
    }
}

/// Readings of one stream, described by its channel set.
#[derive(Debug, Clone)]
pub struct ReadingStream<'a> {
    pub channels: Arc<ChannelSet>,
    pub readings: &'a [Reading],
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldEntry {
    pub key: SpatialKey,
    pub series: Vec<AggregatedSeries>,
}

/// Hourly environmental field: for every spatial key, one finalized series
/// per reading stream.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentField {
    start: DateTime<Utc>,
    length_hours: usize,
    entries: Vec<FieldEntry>,
    #[serde(skip)]
    index: HashMap<SpatialKey, usize>,
    #[serde(skip)]
    issues: Vec<AggregationIssue>,
}

impl EnvironmentField {
    /// Splits every stream by spatial key (keys in first-seen order) and
    /// aggregates each `(key, stream)` pair independently.
    pub fn aggregate(
        streams: &[ReadingStream<'_>],
        start: DateTime<Utc>,
        length_hours: usize,
        seed_leading_slot: bool,
    ) -> Self {
        let mut keys: Vec<SpatialKey> = Vec::new();
        let mut index: HashMap<SpatialKey, usize> = HashMap::new();
        let mut grouped: Vec<HashMap<&SpatialKey, Vec<&Reading>>> = Vec::new();

        for stream in streams {
            let mut by_key: HashMap<&SpatialKey, Vec<&Reading>> = HashMap::new();
            for reading in stream.readings {
                if !index.contains_key(&reading.key) {
                    index.insert(reading.key.clone(), keys.len());
                    keys.push(reading.key.clone());
                }
                by_key.entry(&reading.key).or_default().push(reading);
            }
            grouped.push(by_key);
        }

        let mut entries = Vec::with_capacity(keys.len());
        let mut issues = Vec::new();
        for key in &keys {
            let series: Vec<AggregatedSeries> = streams
                .iter()
                .zip(&grouped)
                .map(|(stream, by_key)| {
                    let mut aggregator = HourBucketAggregator::new(
                        key.clone(),
                        Arc::clone(&stream.channels),
                        start,
                        length_hours,
                    );
                    if let Some(readings) = by_key.get(key) {
                        aggregator.ingest(readings.iter().copied());
                    }
                    aggregator.finalize(seed_leading_slot)
                })
                .collect();

            issues.extend(length_mismatches(key, &series));
            for aggregated in &series {
                if aggregated.gap_fill.unfilled > 0 {
                    issues.push(AggregationIssue::MissingData {
                        series: format!("{}/{}", key, aggregated.channel_set),
                        unfilled: aggregated.gap_fill.unfilled,
                        length: aggregated.series.len(),
                    });
                }
            }
            entries.push(FieldEntry {
                key: key.clone(),
                series,
            });
        }

        tracing::info!(
            target: "drift::ingest",
            keys = entries.len(),
            streams = streams.len(),
            issues = issues.len(),
            "environment_field.aggregated"
        );

        Self {
            start: truncate_to_hour(start),
            length_hours,
            entries,
            index,
            issues,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn length_hours(&self) -> usize {
        self.length_hours
    }

    pub fn keys(&self) -> impl Iterator<Item = &SpatialKey> {
        self.entries.iter().map(|entry| &entry.key)
    }

    pub fn entries(&self) -> &[FieldEntry] {
        &self.entries
    }

    pub fn issues(&self) -> &[AggregationIssue] {
        &self.issues
    }

    pub fn series(&self, key: &SpatialKey, channel_set: &str) -> Option<&AggregatedSeries> {
        let entry = &self.entries[*self.index.get(key)?];
        entry
            .series
            .iter()
            .find(|aggregated| aggregated.channel_set == channel_set)
    }

    /// Hourly value of `channel` at `key`, from whichever stream carries it.
    pub fn value_at(&self, key: &SpatialKey, channel: &str, time: DateTime<Utc>) -> Option<f64> {
        let entry = &self.entries[*self.index.get(key)?];
        entry.series.iter().find_map(|aggregated| {
            let channel_index = aggregated.channel_index(channel)?;
            aggregated.series.value_at(time, channel_index)
        })
    }
}

fn length_mismatches(key: &SpatialKey, series: &[AggregatedSeries]) -> Vec<AggregationIssue> {
    let Some((first, rest)) = series.split_first() else {
        return Vec::new();
    };
    rest.iter()
        .filter(|other| other.observed_hours != first.observed_hours)
        .map(|other| {
            let issue = AggregationIssue::LengthMismatch {
                key: key.clone(),
                left: first.channel_set.clone(),
                left_hours: first.observed_hours,
                right: other.channel_set.clone(),
                right_hours: other.observed_hours,
            };
            tracing::warn!(target: "drift::ingest", issue = %issue, "environment_field.length_mismatch");
            issue
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelSpec;
    use crate::series::SlotStatus;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 4, 12, 10, 0, 0).unwrap()
    }

    fn salinity() -> Arc<ChannelSet> {
        Arc::new(
            ChannelSet::new(
                "salinity",
                vec![
                    ChannelSpec::required("temperature", 8.0),
                    ChannelSpec::required("conductivity", 20.0),
                ],
            )
            .unwrap(),
        )
    }

    fn turbidity() -> Arc<ChannelSet> {
        Arc::new(
            ChannelSet::new("turbidity", vec![ChannelSpec::required("turbidity", 10.0)]).unwrap(),
        )
    }

    fn reading(key: &str, minutes: i64, temperature: f64, conductivity: f64) -> Reading {
        Reading::new(start() + Duration::minutes(minutes), key)
            .with_value("temperature", temperature)
            .with_value("conductivity", conductivity)
    }

    #[test]
    fn hourly_average_matches_arithmetic_mean() {
        let mut aggregator = HourBucketAggregator::new("a".into(), salinity(), start(), 4);
        let readings = vec![
            reading("a", 5, 7.0, 30.0),
            reading("a", 20, 8.0, 31.0),
            reading("a", 59, 9.5, 32.5),
            reading("a", 61, 6.0, 29.0),
        ];
        let stats = aggregator.ingest(&readings);
        assert_eq!(stats.accepted, 4);

        let aggregated = aggregator.finalize(false);
        let first = aggregated.series.slot(0).unwrap();
        assert_eq!(first.status(), SlotStatus::Observed);
        assert_eq!(first.samples(), 3);
        assert!((first.values()[0] - 24.5 / 3.0).abs() < 1e-12);
        assert!((first.values()[1] - 93.5 / 3.0).abs() < 1e-12);
        assert_eq!(aggregated.series.slot(1).unwrap().values(), &[6.0, 29.0]);
        assert_eq!(aggregated.observed_hours, 2);
    }

    #[test]
    fn start_is_truncated_to_the_hour() {
        let aggregator = HourBucketAggregator::new(
            "a".into(),
            salinity(),
            start() + Duration::minutes(42),
            2,
        );
        assert_eq!(aggregator.series().start(), start());
    }

    #[test]
    fn out_of_range_foreign_and_incomplete_readings_are_skipped() {
        let mut aggregator = HourBucketAggregator::new("a".into(), salinity(), start(), 2);
        let readings = vec![
            reading("a", -1, 7.0, 30.0),
            reading("a", 120, 7.0, 30.0),
            reading("b", 10, 7.0, 30.0),
            Reading::new(start(), "a").with_value("temperature", 7.0),
            reading("a", 10, 7.0, 30.0),
        ];
        let stats = aggregator.ingest(&readings);
        assert_eq!(
            stats,
            IngestStats {
                accepted: 1,
                out_of_range: 2,
                foreign_key: 1,
                missing_channel: 1,
            }
        );
        assert_eq!(aggregator.series().slot(0).unwrap().samples(), 1);
        assert_eq!(aggregator.series().slot(1).unwrap().samples(), 0);
    }

    #[test]
    fn gaps_are_filled_on_finalize() {
        let mut aggregator = HourBucketAggregator::new("a".into(), salinity(), start(), 4);
        aggregator.ingest(&[reading("a", 0, 6.0, 30.0), reading("a", 180, 8.0, 34.0)]);
        let aggregated = aggregator.finalize(false);

        let statuses: Vec<SlotStatus> = aggregated
            .series
            .slots()
            .iter()
            .map(|slot| slot.status())
            .collect();
        assert_eq!(
            statuses,
            vec![
                SlotStatus::Observed,
                SlotStatus::Interpolated,
                SlotStatus::Interpolated,
                SlotStatus::Observed,
            ]
        );
        assert_eq!(aggregated.series.slot(1).unwrap().values(), &[7.0, 32.0]);
        assert_eq!(aggregated.series.slot(2).unwrap().values(), &[7.5, 33.0]);
    }

    #[test]
    fn seeding_fills_an_empty_leading_hour() {
        let mut aggregator = HourBucketAggregator::new("a".into(), salinity(), start(), 3);
        aggregator.ingest(&[reading("a", 120, 6.0, 30.0)]);
        let aggregated = aggregator.finalize(true);

        let first = aggregated.series.slot(0).unwrap();
        assert_eq!(first.status(), SlotStatus::Interpolated);
        assert_eq!(first.samples(), 0);
        assert_eq!(first.values(), &[8.0, 20.0]);
        assert_eq!(aggregated.series.slot(1).unwrap().values(), &[7.0, 25.0]);
        assert_eq!(aggregated.gap_fill.unfilled, 0);
        assert_eq!(aggregated.observed_hours, 1);
    }

    #[test]
    fn field_reports_length_mismatch_without_failing() {
        let salinity_readings = vec![
            reading("a", 0, 7.0, 30.0),
            reading("a", 60, 7.0, 30.0),
            reading("b", 0, 5.0, 25.0),
        ];
        let turbidity_readings = vec![Reading::new(start(), "a").with_value("turbidity", 1.5)];
        let streams = [
            ReadingStream {
                channels: salinity(),
                readings: &salinity_readings,
            },
            ReadingStream {
                channels: turbidity(),
                readings: &turbidity_readings,
            },
        ];

        let field = EnvironmentField::aggregate(&streams, start(), 2, false);
        let keys: Vec<&str> = field.keys().map(SpatialKey::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);

        let mismatches: Vec<&AggregationIssue> = field
            .issues()
            .iter()
            .filter(|issue| matches!(issue, AggregationIssue::LengthMismatch { .. }))
            .collect();
        assert_eq!(mismatches.len(), 2);
        assert!(matches!(
            mismatches[0],
            AggregationIssue::LengthMismatch {
                left_hours: 2,
                right_hours: 1,
                ..
            }
        ));

        let a = SpatialKey::from("a");
        let turbid = field.series(&a, "turbidity").unwrap();
        assert_eq!(turbid.series.slot(1).unwrap().values(), &[1.5]);
        assert_eq!(turbid.series.slot(1).unwrap().status(), SlotStatus::Interpolated);
        assert_eq!(
            field.value_at(&a, "conductivity", start() + Duration::minutes(30)),
            Some(30.0)
        );
        assert_eq!(
            field.value_at(&a, "turbidity", start() + Duration::minutes(90)),
            Some(1.5)
        );
        assert_eq!(field.value_at(&SpatialKey::from("zzz"), "turbidity", start()), None);
    }
}
