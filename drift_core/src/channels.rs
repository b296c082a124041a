//! Channel-set descriptors.
//!
//! Every reading stream and every lander carries a fixed list of named
//! channels. The list is declared once in configuration and resolved against
//! incoming name → value maps before any aggregation touches a series, so a
//! missing channel is an explicit `None` rather than a lookup failure.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-channel values aligned with a [`ChannelSet`]; `None` marks an absent
/// optional channel.
pub type ResolvedValues = Vec<Option<f64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub placeholder: f64,
}

fn default_required() -> bool {
    true
}

impl ChannelSpec {
    pub fn required(name: &str, placeholder: f64) -> Self {
        Self {
            name: name.to_string(),
            required: true,
            placeholder,
        }
    }

    pub fn optional(name: &str, placeholder: f64) -> Self {
        Self {
            name: name.to_string(),
            required: false,
            placeholder,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel set {set} is missing required channel {channel}")]
    MissingRequired { set: String, channel: String },
    #[error("channel set {set} declares channel {channel} more than once")]
    Duplicate { set: String, channel: String },
    #[error("channel set {set} declares no channels")]
    Empty { set: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSet {
    name: String,
    channels: Vec<ChannelSpec>,
}

impl ChannelSet {
    pub fn new(name: &str, channels: Vec<ChannelSpec>) -> Result<Self, ChannelError> {
        let set = Self {
            name: name.to_string(),
            channels,
        };
        set.validate()?;
        Ok(set)
    }

    /// Checks invariants that deserialization cannot enforce.
    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.channels.is_empty() {
            return Err(ChannelError::Empty {
                set: self.name.clone(),
            });
        }
        let mut seen = HashSet::new();
        for spec in &self.channels {
            if !seen.insert(spec.name.as_str()) {
                return Err(ChannelError::Duplicate {
                    set: self.name.clone(),
                    channel: spec.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn specs(&self) -> &[ChannelSpec] {
        &self.channels
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|spec| spec.name.as_str())
    }

    pub fn index_of(&self, channel: &str) -> Option<usize> {
        self.channels.iter().position(|spec| spec.name == channel)
    }

    pub fn placeholders(&self) -> Vec<f64> {
        self.channels.iter().map(|spec| spec.placeholder).collect()
    }

    /// Aligns a name → value map with this set. Non-finite values are treated
    /// as absent.
    pub fn resolve(&self, raw: &HashMap<String, f64>) -> Result<ResolvedValues, ChannelError> {
        let mut resolved = Vec::with_capacity(self.channels.len());
        for spec in &self.channels {
            let value = raw.get(&spec.name).copied().filter(|v| v.is_finite());
            if value.is_none() && spec.required {
                return Err(ChannelError::MissingRequired {
                    set: self.name.clone(),
                    channel: spec.name.clone(),
                });
            }
            resolved.push(value);
        }
        Ok(resolved)
    }
}
