//! Every input and output file the pipeline touches, named explicitly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Optional per-file overrides from the `[paths]` config table.
///
/// Relative paths are resolved against the data directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathOverrides {
    pub standardized_crashes: Option<PathBuf>,
    pub standardized_concerns: Option<PathBuf>,
    pub inters_segments: Option<PathBuf>,
    pub non_inters_segments: Option<PathBuf>,
    pub inters_data: Option<PathBuf>,
    pub snapped_atrs: Option<PathBuf>,
    pub crash_joined: Option<PathBuf>,
    pub concern_joined: Option<PathBuf>,
    pub crash_rollup: Option<PathBuf>,
    pub canonical_dataset: Option<PathBuf>,
    pub adjacency: Option<PathBuf>,
    pub pipeline_state: Option<PathBuf>,
}

/// Resolved file locations for one city's data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    /// Root of this city's data.
    pub data_dir: PathBuf,
    /// Standardized crashes written by the transformation stage.
    pub standardized_crashes: PathBuf,
    /// Standardized concerns written by the transformation stage.
    pub standardized_concerns: PathBuf,
    /// Intersection segment lines (`GeoJSON`).
    pub inters_segments: PathBuf,
    /// Non-intersection segment lines with road features (`GeoJSON`).
    pub non_inters_segments: PathBuf,
    /// Intersection id to property sets (JSON).
    pub inters_data: PathBuf,
    /// Traffic counter stations snapped to segments (JSON, optional).
    pub snapped_atrs: PathBuf,
    /// Crashes with their nearest segment id.
    pub crash_joined: PathBuf,
    /// Concerns with their nearest segment id.
    pub concern_joined: PathBuf,
    /// Per-location crash rollup (`GeoJSON`).
    pub crash_rollup: PathBuf,
    /// Canonical per-segment, per-week dataset (gzip CSV).
    pub canonical_dataset: PathBuf,
    /// Segment adjacency table (CSV).
    pub adjacency: PathBuf,
    /// Pipeline stage state record (JSON).
    pub pipeline_state: PathBuf,
}

impl DataPaths {
    /// Standard layout under `data_dir`.
    #[must_use]
    pub fn from_data_dir(data_dir: &Path) -> Self {
        let standardized = data_dir.join("standardized");
        let processed = data_dir.join("processed");
        let maps = processed.join("maps");

        Self {
            data_dir: data_dir.to_path_buf(),
            standardized_crashes: standardized.join("crashes.json"),
            standardized_concerns: standardized.join("concerns.json"),
            inters_segments: maps.join("inters_segments.geojson"),
            non_inters_segments: maps.join("non_inters_segments.geojson"),
            inters_data: processed.join("inters_data.json"),
            snapped_atrs: processed.join("snapped_atrs.json"),
            crash_joined: processed.join("crash_joined.json"),
            concern_joined: processed.join("concern_joined.json"),
            crash_rollup: processed.join("crashes_rollup.geojson"),
            canonical_dataset: processed.join("vz_predict_dataset.csv.gz"),
            adjacency: processed.join("adjacency_info.csv"),
            pipeline_state: data_dir.join("pipeline_state.json"),
        }
    }

    /// Applies `[paths]` overrides on top of the standard layout.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &PathOverrides) -> Self {
        let dir = self.data_dir.clone();
        let apply = |target: &mut PathBuf, value: Option<&PathBuf>| {
            if let Some(path) = value {
                *target = dir.join(path);
            }
        };

        apply(&mut self.standardized_crashes, overrides.standardized_crashes.as_ref());
        apply(&mut self.standardized_concerns, overrides.standardized_concerns.as_ref());
        apply(&mut self.inters_segments, overrides.inters_segments.as_ref());
        apply(&mut self.non_inters_segments, overrides.non_inters_segments.as_ref());
        apply(&mut self.inters_data, overrides.inters_data.as_ref());
        apply(&mut self.snapped_atrs, overrides.snapped_atrs.as_ref());
        apply(&mut self.crash_joined, overrides.crash_joined.as_ref());
        apply(&mut self.concern_joined, overrides.concern_joined.as_ref());
        apply(&mut self.crash_rollup, overrides.crash_rollup.as_ref());
        apply(&mut self.canonical_dataset, overrides.canonical_dataset.as_ref());
        apply(&mut self.adjacency, overrides.adjacency.as_ref());
        apply(&mut self.pipeline_state, overrides.pipeline_state.as_ref());
        self
    }
}
