use chrono::{DateTime, Utc};
use drift_schema::SpatialKey;
use thiserror::Error;

/// Data-shape anomalies met while aggregating.
///
/// None of these abort a run. They are logged where they occur and collected
/// by the owning aggregate so callers can report on them afterwards.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregationIssue {
    #[error("{series}: {unfilled} of {length} hour slots never received an anchor")]
    MissingData {
        series: String,
        unfilled: usize,
        length: usize,
    },
    #[error("{key}: channel set {left} observed {left_hours} hours but {right} observed {right_hours}")]
    LengthMismatch {
        key: SpatialKey,
        left: String,
        left_hours: usize,
        right: String,
        right_hours: usize,
    },
    #[error("sample at {time} falls outside [{start}, +{length_hours}h)")]
    OutOfRangeSample {
        time: DateTime<Utc>,
        start: DateTime<Utc>,
        length_hours: usize,
    },
    #[error("{axis} axis: cell size {cell_size} against extent {extent} yields {spans} span(s)")]
    DegenerateGrid {
        axis: &'static str,
        cell_size: f64,
        extent: f64,
        spans: usize,
    },
}
