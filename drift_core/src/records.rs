//! Finalized landers as flat hourly records, and where those records go.

use std::collections::BTreeMap;
use std::io::{self, Write};

use drift_schema::LanderRecord;
use thiserror::Error;

use crate::channels::ChannelSet;
use crate::lander::{FinalizedLander, FinalizedRun};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write records")]
    Io(#[from] io::Error),
    #[error("failed to serialize record for cell {grid_id}")]
    Serialize {
        grid_id: u32,
        #[source]
        source: serde_json::Error,
    },
}

/// Destination for finalized lander records.
pub trait RecordSink {
    fn deliver(&mut self, records: &[LanderRecord]) -> Result<(), SinkError>;
}

/// One record per hour slot of the lander, in slot order.
pub fn lander_records(lander: &FinalizedLander, channels: &ChannelSet) -> Vec<LanderRecord> {
    lander
        .series
        .slots()
        .iter()
        .map(|slot| LanderRecord {
            record_time: slot.hour(),
            values: channels
                .names()
                .zip(slot.values())
                .map(|(name, value)| (name.to_string(), *value))
                .collect::<BTreeMap<_, _>>(),
            grid_id: lander.cell.id,
        })
        .collect()
}

/// Records for every touched lander of the run, or every lander when
/// `include_untouched` is set. Cells appear in ID order.
pub fn run_records(run: &FinalizedRun, include_untouched: bool) -> Vec<LanderRecord> {
    run.landers
        .iter()
        .filter(|lander| include_untouched || lander.touched)
        .flat_map(|lander| lander_records(lander, &run.channels))
        .collect()
}

/// Writes each record as one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn deliver(&mut self, records: &[LanderRecord]) -> Result<(), SinkError> {
        for record in records {
            serde_json::to_writer(&mut self.writer, record).map_err(|source| {
                SinkError::Serialize {
                    grid_id: record.grid_id,
                    source,
                }
            })?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        self.written += records.len();
        tracing::debug!(target: "drift::sink", records = records.len(), total = self.written, "json_lines.delivered");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<LanderRecord>,
}

impl MemorySink {
    pub fn records(&self) -> &[LanderRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<LanderRecord> {
        self.records
    }
}

impl RecordSink for MemorySink {
    fn deliver(&mut self, records: &[LanderRecord]) -> Result<(), SinkError> {
        self.records.extend_from_slice(records);
        Ok(())
    }
}

/// Plain-text dump of each lander: center and bounds, then one line per hour.
pub fn write_lander_report<W: Write>(
    out: &mut W,
    run: &FinalizedRun,
    include_untouched: bool,
) -> io::Result<()> {
    let names: Vec<&str> = run.channels.names().collect();
    for lander in run
        .landers
        .iter()
        .filter(|lander| include_untouched || lander.touched)
    {
        let cell = &lander.cell;
        let (lat, lon) = cell.center();
        writeln!(out, "lander {}", cell.id)?;
        writeln!(out, "  center   {lat:.5}, {lon:.5}")?;
        writeln!(
            out,
            "  bounds   lat [{:.5}, {:.5}] lon [{:.5}, {:.5}]",
            cell.min_lat, cell.max_lat, cell.min_lon, cell.max_lon
        )?;
        writeln!(
            out,
            "  filled   {} interpolated, {} carried, {} unfilled",
            lander.gap_fill.interpolated, lander.gap_fill.carried_forward, lander.gap_fill.unfilled
        )?;
        for slot in lander.series.slots() {
            write!(out, "  {}", slot.hour().format("%Y-%m-%dT%H:%MZ"))?;
            for (name, value) in names.iter().zip(slot.values()) {
                write!(out, " {name}={value:.4}")?;
            }
            writeln!(out, " [{:?}]", slot.status())?;
        }
    }
    Ok(())
}
