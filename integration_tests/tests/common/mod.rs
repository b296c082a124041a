#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Once;

use anyhow::{Context, Result};
use drift_core::{FinalizedRun, RunConfig};
use drift_schema::{ParticleSample, Reading};

static INIT: Once = Once::new();

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixture_path("test_run_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test run config at {}",
            config_path.display()
        );

        std::env::set_var("DRIFT_RUN_CONFIG_PATH", &config_path);
    });
}

pub fn test_config() -> Result<RunConfig> {
    let config = RunConfig::from_file(&fixture_path("test_run_config.json"))?;
    Ok(config)
}

pub fn load_readings() -> Result<Vec<Reading>> {
    let path = fixture_path("readings.json");
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn load_samples() -> Result<Vec<ParticleSample>> {
    let path = fixture_path("samples.jsonl");
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).context("invalid sample line"))
        .collect()
}

/// Records every fixture sample one by one and finalizes with the config's
/// options.
pub fn run_fixture_samples(config: &RunConfig, samples: &[ParticleSample]) -> Result<FinalizedRun> {
    let landers = config.lander_grid()?;
    for sample in samples {
        landers.record(sample);
    }
    Ok(landers.finalize(config.finalize_options()))
}
