use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channels::{ChannelError, ChannelSet, ChannelSpec};
use crate::grid::{CellSize, GridBounds, SpatialGrid};
use crate::lander::{FinalizeOptions, LanderGrid, MergePolicy};

pub const BUILTIN_RUN_CONFIG: &str = include_str!("data/run_config.json");
pub const RUN_CONFIG_ENV: &str = "DRIFT_RUN_CONFIG_PATH";

/// Name of the channel set every lander carries.
pub const LANDER_CHANNEL_SET: &str = "lander";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse run config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read run config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid channel declaration: {0}")]
    Channel(#[from] ChannelError),
    #[error("run.length_hours must be positive")]
    EmptyRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunWindow {
    pub start: DateTime<Utc>,
    pub length_hours: usize,
}

impl Default for RunWindow {
    fn default() -> Self {
        Self {
            start: Utc
                .with_ymd_and_hms(2023, 4, 12, 15, 0, 0)
                .single()
                .unwrap_or_default(),
            length_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub bounds: GridBounds,
    pub cell_size: CellSize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub run: RunWindow,
    pub grid: GridConfig,
    pub merge_policy: MergePolicy,
    pub seed_leading_slot: bool,
    pub emit_untouched_cells: bool,
    pub lander_channels: Vec<ChannelSpec>,
    pub ingest_streams: Vec<ChannelSet>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run: RunWindow::default(),
            grid: GridConfig::default(),
            merge_policy: MergePolicy::default(),
            seed_leading_slot: false,
            emit_untouched_cells: false,
            lander_channels: vec![
                ChannelSpec::required("salinity", 20.0),
                ChannelSpec::required("temperature", 8.0),
                ChannelSpec::optional("turbidity", 10.0),
            ],
            ingest_streams: Vec::new(),
        }
    }
}

impl RunConfig {
    pub fn builtin() -> Self {
        serde_json::from_str(BUILTIN_RUN_CONFIG).expect("builtin run config should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        RunConfig::from_json_str(&contents)
    }

    /// Checks what deserialization alone cannot: a non-empty run and
    /// well-formed channel sets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.length_hours == 0 {
            return Err(ConfigError::EmptyRun);
        }
        self.lander_channel_set()?;
        for stream in &self.ingest_streams {
            stream.validate()?;
        }
        Ok(())
    }

    pub fn lander_channel_set(&self) -> Result<Arc<ChannelSet>, ConfigError> {
        let set = ChannelSet::new(LANDER_CHANNEL_SET, self.lander_channels.clone())?;
        Ok(Arc::new(set))
    }

    pub fn ingest_channel_sets(&self) -> Vec<Arc<ChannelSet>> {
        self.ingest_streams.iter().cloned().map(Arc::new).collect()
    }

    pub fn build_grid(&self) -> SpatialGrid {
        SpatialGrid::build(self.grid.bounds, self.grid.cell_size)
    }

    /// Fresh lander context for this run: grid, channels and policy as
    /// configured.
    pub fn lander_grid(&self) -> Result<LanderGrid, ConfigError> {
        Ok(LanderGrid::new(
            self.build_grid(),
            self.lander_channel_set()?,
            self.run.start,
            self.run.length_hours,
            self.merge_policy,
        ))
    }

    pub fn finalize_options(&self) -> FinalizeOptions {
        FinalizeOptions {
            seed_leading_slot: self.seed_leading_slot,
        }
    }
}

/// Where the active run config came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Builtin,
}

/// Loads the run config named by `DRIFT_RUN_CONFIG_PATH`, or the bundled
/// default file, falling back to the compiled-in copy if that fails.
pub fn load_run_config_from_env() -> (RunConfig, ConfigSource) {
    let path = env::var(RUN_CONFIG_ENV)
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/run_config.json"));

    match RunConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "drift::config",
                path = %path.display(),
                "run_config.loaded=file"
            );
            return (config, ConfigSource::File(path));
        }
        Err(err) => {
            tracing::warn!(
                target: "drift::config",
                path = %path.display(),
                error = %err,
                "run_config.load_failed"
            );
        }
    }

    tracing::info!(target: "drift::config", "run_config.loaded=builtin");
    (RunConfig::builtin(), ConfigSource::Builtin)
}
