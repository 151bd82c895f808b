#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Pipeline configuration.
//!
//! A city is described by one TOML file: its name (which selects the data
//! directory), optional concern sources, the year range to keep, the road
//! features to carry into the canonical dataset, and the external commands
//! each pipeline stage runs. Relative paths in the file resolve against
//! the file's own directory, never the working directory.

pub mod paths;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vz_record_models::{EventKind, NEAR_ID_FIELD, Reducer};

pub use paths::{DataPaths, PathOverrides};

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading the config file.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Config file path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// TOML parsing failed.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value parsed but makes no sense.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Description of what was wrong.
        message: String,
    },
}

/// Road feature columns carried into the canonical dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Feature property names, in output column order.
    pub columns: Vec<String>,
    /// How duplicate segment ids combine their values.
    pub reducer: Reducer,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            columns: ["AADT", "SPEEDLIMIT", "Struct_Cnd", "Surface_Tp", "F_F_Class"]
                .into_iter()
                .map(String::from)
                .collect(),
            reducer: Reducer::default(),
        }
    }
}

/// Field names read from event records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordFields {
    /// Timestamp field on crash records.
    pub crash_date_field: String,
    /// Timestamp field on concern records.
    pub concern_date_field: String,
    /// Segment id field on joined records.
    pub id_field: String,
}

impl Default for RecordFields {
    fn default() -> Self {
        Self {
            crash_date_field: EventKind::Crash.default_timestamp_field().to_string(),
            concern_date_field: EventKind::Concern.default_timestamp_field().to_string(),
            id_field: NEAR_ID_FIELD.to_string(),
        }
    }
}

/// Spatial join settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Events farther than this many metres from every segment stay
    /// unassigned. `None` assigns every event.
    pub tolerance_m: Option<f64>,
}

/// Base command lines (program followed by arguments) for each stage.
///
/// The pipeline appends the stage-specific arguments. An empty list
/// disables the command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub transform_crashes: Vec<String>,
    pub transform_concerns: Vec<String>,
    pub join: Vec<String>,
    pub generate: Vec<String>,
    pub model: Vec<String>,
    pub visualization: Vec<String>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        let args = |parts: &[&str]| parts.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
        Self {
            transform_crashes: args(&["python", "-m", "data_transformation.transform_crashes"]),
            transform_concerns: args(&["python", "-m", "data_transformation.transform_concerns"]),
            join: args(&["vz_canon", "join"]),
            generate: args(&["vz_canon", "generate"]),
            model: args(&["python", "-m", "models.train_model"]),
            visualization: Vec::new(),
        }
    }
}

/// A city's pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// City name; selects the data directory under `data_root`.
    pub name: String,
    /// Directory holding one data directory per city.
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    /// Raw concern sources. Empty means the city has no concern data.
    #[serde(default)]
    pub concern_files: Vec<String>,
    /// First year of data to keep.
    #[serde(default)]
    pub start_year: Option<i32>,
    /// Year at which data stops being kept (exclusive).
    #[serde(default)]
    pub end_year: Option<i32>,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub records: RecordFields,
    #[serde(default)]
    pub join: JoinConfig,
    #[serde(default)]
    pub paths: PathOverrides,
    #[serde(default)]
    pub commands: CommandConfig,
    /// Directory relative paths resolve against. Set by [`Config::load`].
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}

impl Config {
    /// Loads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::parse(&contents)?;
        config.base_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        log::info!("Loaded config for {} from {}", config.name, path.display());
        Ok(config)
    }

    /// Parses and validates a config from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or fails validation.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "name must not be empty".to_string(),
            });
        }
        if let (Some(start), Some(end)) = (self.start_year, self.end_year)
            && start >= end
        {
            return Err(ConfigError::Invalid {
                message: format!("start_year {start} must be before end_year {end}"),
            });
        }
        if self.features.columns.is_empty() {
            return Err(ConfigError::Invalid {
                message: "features.columns must name at least one road feature".to_string(),
            });
        }
        if let Some(tolerance) = self.join.tolerance_m
            && !(tolerance.is_finite() && tolerance >= 0.0)
        {
            return Err(ConfigError::Invalid {
                message: format!("join.tolerance_m must be a non-negative number, got {tolerance}"),
            });
        }
        Ok(())
    }

    /// Whether any concern sources are configured.
    #[must_use]
    pub fn has_concerns(&self) -> bool {
        !self.concern_files.is_empty()
    }

    /// This city's data directory: `<base_dir>/<data_root>/<name>`.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join(&self.data_root).join(&self.name)
    }

    /// Resolved file locations for this city.
    #[must_use]
    pub fn data_paths(&self) -> DataPaths {
        self.data_paths_in(&self.data_dir())
    }

    /// Resolved file locations under an explicit data directory.
    #[must_use]
    pub fn data_paths_in(&self, data_dir: &Path) -> DataPaths {
        DataPaths::from_data_dir(data_dir).with_overrides(&self.paths)
    }
}
