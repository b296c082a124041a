mod common;

use chrono::{Duration, TimeZone, Utc};
use drift_core::{
    run_records, write_lander_report, AggregationIssue, EnvironmentField, JsonLinesSink,
    ReadingStream, RecordSink, SlotStatus,
};
use drift_schema::{LanderRecord, SpatialKey};

#[test]
fn readings_aggregate_into_environment_field() {
    let config = common::test_config().unwrap();
    let readings = common::load_readings().unwrap();
    let sets = config.ingest_channel_sets();
    let streams: Vec<ReadingStream<'_>> = sets
        .iter()
        .map(|channels| ReadingStream {
            channels: channels.clone(),
            readings: &readings,
        })
        .collect();

    let field = EnvironmentField::aggregate(
        &streams,
        config.run.start,
        config.run.length_hours,
        config.seed_leading_slot,
    );

    let north = SpatialKey::from_coordinates(59.1, 10.2);
    let south = SpatialKey::from_coordinates(59.05, 10.1);
    let keys: Vec<&SpatialKey> = field.keys().collect();
    assert_eq!(keys, vec![&north, &south]);

    let salinity = field.series(&north, "salinity").unwrap();
    assert_eq!(salinity.observed_hours, 3);
    assert_eq!(salinity.stats.out_of_range, 1);
    assert_eq!(salinity.series.slot(0).unwrap().values(), &[8.0, 31.0]);
    assert_eq!(salinity.series.slot(2).unwrap().values(), &[9.0, 33.0]);
    assert_eq!(salinity.series.slot(2).unwrap().status(), SlotStatus::Interpolated);
    assert_eq!(salinity.series.slot(5).unwrap().values(), &[10.0, 35.0]);

    let turbidity = field.series(&north, "turbidity").unwrap();
    assert_eq!(turbidity.observed_hours, 2);
    assert_eq!(turbidity.stats.missing_channel, 2);

    let start = config.run.start;
    assert_eq!(
        field.value_at(&north, "turbidity", start + Duration::minutes(90)),
        Some(14.0)
    );
    assert_eq!(
        field.value_at(&north, "conductivity", start + Duration::minutes(150)),
        Some(33.0)
    );
    assert_eq!(
        field.value_at(&south, "temperature", start + Duration::hours(5)),
        Some(6.5)
    );
    assert_eq!(field.value_at(&south, "temperature", start + Duration::hours(6)), None);

    assert_eq!(field.issues().len(), 1);
    assert!(matches!(
        &field.issues()[0],
        AggregationIssue::LengthMismatch { key, left_hours: 3, right_hours: 2, .. } if *key == north
    ));

    let json = serde_json::to_value(&field).unwrap();
    assert_eq!(json["length_hours"], 6);
    assert_eq!(json["entries"][0]["key"], "59.100000,10.200000");
}

#[test]
fn samples_produce_gap_filled_lander_records() {
    let config = common::test_config().unwrap();
    let samples = common::load_samples().unwrap();
    let run = common::run_fixture_samples(&config, &samples).unwrap();

    let tally = run.metrics.samples;
    assert_eq!(tally.stored, 4);
    assert_eq!(tally.merged, 2);
    assert_eq!(tally.outside_grid, 1);
    assert_eq!(tally.out_of_range, 1);
    assert_eq!(tally.missing_channel, 1);
    assert_eq!(run.metrics.cells, 9);
    assert_eq!(run.metrics.cells_touched, 2);

    let first = run.lander(1).unwrap();
    let salinity: Vec<f64> = first.series.slots().iter().map(|s| s.values()[0]).collect();
    assert_eq!(salinity, vec![31.0, 32.5, 34.0, 30.0, 28.0, 26.0]);
    let turbidity: Vec<f64> = first.series.slots().iter().map(|s| s.values()[2]).collect();
    assert_eq!(turbidity, vec![10.0, 12.0, 14.0, 12.0, 11.0, 10.0]);

    let sixth = run.lander(6).unwrap();
    assert_eq!(sixth.series.slot(0).unwrap().status(), SlotStatus::Unfilled);
    assert_eq!(sixth.series.slot(1).unwrap().values(), &[30.0, 8.0, 10.0]);
    assert_eq!(sixth.series.slot(5).unwrap().values(), &[30.0, 8.0, 10.0]);
    assert!(matches!(
        run.issues.as_slice(),
        [AggregationIssue::MissingData { unfilled: 1, .. }]
    ));

    let records = run_records(&run, config.emit_untouched_cells);
    assert_eq!(records.len(), 12);
    let mut sink = JsonLinesSink::new(Vec::new());
    sink.deliver(&records).unwrap();
    let text = String::from_utf8(sink.into_inner()).unwrap();
    let parsed: Vec<LanderRecord> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(parsed, records);
    assert_eq!(
        parsed[6].record_time,
        Utc.with_ymd_and_hms(2023, 4, 12, 15, 0, 0).unwrap()
    );
    assert_eq!(parsed[6].grid_id, 6);

    let mut report = Vec::new();
    write_lander_report(&mut report, &run, false).unwrap();
    let report = String::from_utf8(report).unwrap();
    assert!(report.contains("lander 1\n"));
    assert!(report.contains("lander 6\n"));
    assert!(!report.contains("lander 2\n"));
}
