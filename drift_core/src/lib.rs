//! Hourly aggregation core for the drift pipeline.
//!
//! Two sides share one hourly series model and one gap filler:
//!
//! - ingest: timestamped sensor [`Reading`](drift_schema::Reading)s are
//!   bucketed per spatial key into an [`EnvironmentField`];
//! - landers: per-step [`ParticleSample`](drift_schema::ParticleSample)s from
//!   the drift simulation are routed through a [`SpatialGrid`] into one
//!   [`LanderSeries`] per cell and emitted as hourly
//!   [`LanderRecord`](drift_schema::LanderRecord)s.

pub mod channels;
pub mod config;
pub mod gap_fill;
pub mod grid;
pub mod ingest;
pub mod issues;
pub mod lander;
pub mod metrics;
pub mod records;
pub mod series;

pub use channels::{ChannelError, ChannelSet, ChannelSpec, ResolvedValues};
pub use config::{load_run_config_from_env, ConfigError, ConfigSource, RunConfig};
pub use gap_fill::{fill_gaps, GapFillReport};
pub use grid::{CellSize, GridBounds, SpatialCell, SpatialGrid, FIRST_CELL_ID};
pub use ingest::{
    AggregatedSeries, EnvironmentField, HourBucketAggregator, IngestStats, ReadingStream,
};
pub use issues::AggregationIssue;
pub use lander::{
    FinalizeOptions, FinalizedLander, FinalizedRun, LanderGrid, LanderSeries, MergePolicy,
    SampleOutcome, UpdateOutcome,
};
pub use metrics::{AggregationMetrics, SampleTally};
pub use records::{
    lander_records, run_records, write_lander_report, JsonLinesSink, MemorySink, RecordSink,
    SinkError,
};
pub use series::{HourSlot, HourlySeries, SlotStatus};
