//! Sweep files and user defaults.
//!
//! A sweep file is TOML:
//!
//! ```toml
//! program = "cleanrl/sdm_rl.py"
//! interpreter = "python"
//! exp_name = "sdm_rl"
//! total_timesteps = 500000
//! capture_video = true
//! device = "gpu:0"
//! headless = true
//! stagger = "200ms"
//!
//! [[axes]]
//! name = "seed"
//! values = [1, 2]
//!
//! [[axes]]
//! name = "env-id"
//! values = ["CartPole-v1", "Acrobot-v1"]
//! ```
//!
//! Axes keep their declaration order. User defaults live in
//! `<config dir>/sweeprun/config.toml` and only fill gaps.

use crate::error::ConfigError;
use crate::model::{Device, SweepAxis};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepFile {
    pub program: Option<PathBuf>,
    pub interpreter: Option<String>,
    pub exp_name: Option<String>,
    pub total_timesteps: Option<u64>,
    pub capture_video: Option<bool>,
    pub track: Option<bool>,
    pub wandb_project_name: Option<String>,
    pub wandb_entity: Option<String>,
    pub device: Option<Device>,
    pub headless: Option<bool>,
    pub display_wrapper: Option<Vec<String>>,
    #[serde(default, with = "humantime_serde")]
    pub stagger: Option<Duration>,
    pub log_dir: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub tag: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub axes: Vec<AxisDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AxisDef {
    pub name: String,
    pub values: Vec<toml::Value>,
}

impl AxisDef {
    fn into_axis(self) -> Result<SweepAxis, ConfigError> {
        let values = self
            .values
            .iter()
            .map(|v| scalar_to_string(v).ok_or_else(|| ConfigError::InvalidAxis {
                axis: self.name.clone(),
                reason: format!("value {v} is not a scalar"),
            }))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SweepAxis {
            name: self.name,
            values,
        })
    }
}

fn scalar_to_string(v: &toml::Value) -> Option<String> {
    match v {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

impl SweepFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Declared axes, in declaration order.
    pub fn axes(&self) -> Result<Vec<SweepAxis>, ConfigError> {
        self.axes.iter().cloned().map(AxisDef::into_axis).collect()
    }
}

/// Replace same-named axes in place, append new ones at the end.
pub fn merge_axes(base: Vec<SweepAxis>, overrides: Vec<SweepAxis>) -> Vec<SweepAxis> {
    let mut merged = base;
    for axis in overrides {
        match merged.iter_mut().find(|a| a.flag() == axis.flag()) {
            Some(existing) => existing.values = axis.values,
            None => merged.push(axis),
        }
    }
    merged
}

/// Per-user defaults for settings that rarely change between invocations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserDefaults {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub aws_bin: Option<String>,
    pub queue: Option<String>,
    pub log_dir: Option<PathBuf>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl UserDefaults {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sweeprun").join("config.toml"))
    }

    /// Load defaults; a missing file means no defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
