use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, Sender};
use tracing::info;

use drift_core::{
    load_run_config_from_env, run_records, write_lander_report, EnvironmentField, FinalizedRun,
    JsonLinesSink, ReadingStream, RecordSink, RunConfig,
};
use drift_schema::{ParticleSample, Reading};

#[derive(Parser, Debug)]
#[command(author, version, about = "Hourly aggregation of sensor readings and lander samples", long_about = None)]
struct Args {
    /// Run config JSON (defaults to DRIFT_RUN_CONFIG_PATH, then the builtin config)
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON array of sensor readings to aggregate into an hourly field
    #[arg(long)]
    readings: Option<PathBuf>,

    /// Where to write the aggregated field as JSON
    #[arg(long)]
    field_out: Option<PathBuf>,

    /// Particle samples, one JSON object per line
    #[arg(long)]
    samples: Option<PathBuf>,

    /// Where to write lander records as JSON lines (stdout when omitted)
    #[arg(long)]
    records_out: Option<PathBuf>,

    /// Write a plain-text per-lander report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Samples handed to the aggregator per batch
    #[arg(long, default_value_t = 4096)]
    batch_size: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("Failed to load run config at {}", path.display()))?,
        None => load_run_config_from_env().0,
    };

    if let Some(path) = &args.readings {
        aggregate_readings(&config, path, args.field_out.as_deref())?;
    }

    if let Some(path) = &args.samples {
        let run = aggregate_samples(&config, path.clone(), args.batch_size.max(1))?;
        emit_records(&config, &run, args.records_out.as_deref())?;
        if let Some(report) = &args.report {
            let mut out = BufWriter::new(
                File::create(report)
                    .with_context(|| format!("Failed to create report at {}", report.display()))?,
            );
            write_lander_report(&mut out, &run, config.emit_untouched_cells)?;
            out.flush()?;
        }
    }

    Ok(())
}

fn aggregate_readings(config: &RunConfig, path: &Path, field_out: Option<&Path>) -> Result<()> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read readings at {}", path.display()))?;
    let readings: Vec<Reading> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse readings at {}", path.display()))?;

    let channel_sets = config.ingest_channel_sets();
    let streams: Vec<ReadingStream<'_>> = channel_sets
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
    info!(
        target: "drift::aggregator",
        readings = readings.len(),
        keys = field.entries().len(),
        issues = field.issues().len(),
        "readings.aggregated"
    );

    if let Some(out) = field_out {
        let file = File::create(out)
            .with_context(|| format!("Failed to create field output at {}", out.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &field)?;
        writer.flush()?;
    }
    Ok(())
}

fn aggregate_samples(config: &RunConfig, path: PathBuf, batch_size: usize) -> Result<FinalizedRun> {
    let landers = config.lander_grid()?;
    let (sender, receiver) = bounded::<Vec<ParticleSample>>(4);
    let reader = thread::spawn(move || read_samples(&path, batch_size, sender));

    for batch in receiver {
        landers.record_batch(&batch);
    }
    let lines = reader
        .join()
        .map_err(|_| anyhow!("sample reader thread panicked"))??;

    let run = landers.finalize(config.finalize_options());
    info!(
        target: "drift::aggregator",
        lines,
        recorded = run.metrics.samples.recorded(),
        cells_touched = run.metrics.cells_touched,
        issues = run.issues.len(),
        "samples.aggregated"
    );
    Ok(run)
}

fn read_samples(path: &Path, batch_size: usize, sender: Sender<Vec<ParticleSample>>) -> Result<usize> {
    let file =
        File::open(path).with_context(|| format!("Failed to open samples at {}", path.display()))?;
    let mut batch = Vec::with_capacity(batch_size);
    let mut lines = 0usize;
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: ParticleSample = serde_json::from_str(&line)
            .with_context(|| format!("Invalid sample on line {} of {}", number + 1, path.display()))?;
        batch.push(sample);
        lines += 1;
        if batch.len() == batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            sender
                .send(full)
                .map_err(|_| anyhow!("aggregator stopped receiving samples"))?;
        }
    }
    if !batch.is_empty() {
        sender
            .send(batch)
            .map_err(|_| anyhow!("aggregator stopped receiving samples"))?;
    }
    Ok(lines)
}

fn emit_records(config: &RunConfig, run: &FinalizedRun, out: Option<&Path>) -> Result<()> {
    let writer: Box<dyn Write> = match out {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("Failed to create records output at {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let records = run_records(run, config.emit_untouched_cells);
    let mut sink = JsonLinesSink::new(BufWriter::new(writer));
    sink.deliver(&records)?;
    info!(
        target: "drift::aggregator",
        records = sink.written(),
        "records.emitted"
    );
    Ok(())
}
