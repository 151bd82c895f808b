//! Pipeline stages and the files each one reads and writes.

use std::path::{Path, PathBuf};

use strum_macros::{AsRefStr, Display, EnumString};
use vz_config::{Config, DataPaths};

/// A named pipeline stage, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    /// Standardize raw crash and concern files.
    Transformation,
    /// Join events to segments and build the canonical dataset.
    Generation,
    /// Train the model.
    Model,
    /// Build visualization outputs.
    Visualization,
}

impl Stage {
    /// Every stage, in run order.
    pub const ALL: &[Self] = &[
        Self::Transformation,
        Self::Generation,
        Self::Model,
        Self::Visualization,
    ];

    /// Files whose contents decide whether the stage must rerun.
    ///
    /// The config file is always an input.
    #[must_use]
    pub fn inputs(self, config: &Config, config_path: &Path, paths: &DataPaths) -> Vec<PathBuf> {
        let mut inputs = vec![config_path.to_path_buf()];
        match self {
            Self::Transformation => {}
            Self::Generation => {
                inputs.push(paths.standardized_crashes.clone());
                if config.has_concerns() {
                    inputs.push(paths.standardized_concerns.clone());
                }
                inputs.extend([
                    paths.inters_segments.clone(),
                    paths.non_inters_segments.clone(),
                    paths.inters_data.clone(),
                    paths.snapped_atrs.clone(),
                ]);
            }
            Self::Model => {
                inputs.extend([paths.canonical_dataset.clone(), paths.adjacency.clone()]);
            }
            Self::Visualization => {
                inputs.extend([paths.canonical_dataset.clone(), paths.crash_rollup.clone()]);
            }
        }
        inputs
    }

    /// Files the stage must leave behind to count as complete.
    #[must_use]
    pub fn outputs(self, config: &Config, paths: &DataPaths) -> Vec<PathBuf> {
        match self {
            Self::Transformation => {
                let mut outputs = vec![paths.standardized_crashes.clone()];
                if config.has_concerns() {
                    outputs.push(paths.standardized_concerns.clone());
                }
                outputs
            }
            Self::Generation => {
                let mut outputs = vec![paths.crash_joined.clone()];
                if config.has_concerns() {
                    outputs.push(paths.concern_joined.clone());
                }
                outputs.extend([
                    paths.crash_rollup.clone(),
                    paths.canonical_dataset.clone(),
                    paths.adjacency.clone(),
                ]);
                outputs
            }
            Self::Model | Self::Visualization => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn parses_stage_names() {
        assert_eq!(Stage::from_str("generation").unwrap(), Stage::Generation);
        assert_eq!(Stage::Visualization.to_string(), "visualization");
        assert!(Stage::from_str("deploy").is_err());
    }

    #[test]
    fn concern_files_only_matter_when_configured() {
        let config = Config::parse("name = \"boston\"").unwrap();
        let paths = config.data_paths();
        let inputs = Stage::Generation.inputs(&config, Path::new("boston.toml"), &paths);
        assert!(!inputs.contains(&paths.standardized_concerns));
        assert!(!Stage::Generation.outputs(&config, &paths).contains(&paths.concern_joined));

        let config = Config::parse("name = \"boston\"\nconcern_files = [\"c.csv\"]").unwrap();
        let paths = config.data_paths();
        let inputs = Stage::Generation.inputs(&config, Path::new("boston.toml"), &paths);
        assert!(inputs.contains(&paths.standardized_concerns));
        assert_eq!(inputs[0], Path::new("boston.toml"));
    }
}
