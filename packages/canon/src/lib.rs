#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Canonical dataset generation.
//!
//! Joins crash and concern events to their nearest road segment, counts
//! them per segment and ISO week, and merges the counts with static road
//! features into a dense segment-by-week panel written as gzip CSV. Also
//! writes the segment adjacency table and the per-location crash rollup.

pub mod join;
pub mod merge;
pub mod output;
pub mod road;

use vz_config::{Config, DataPaths};
use vz_record::{CountOptions, DateWindow};
use vz_record_models::{BucketCounts, DatePart, EventKind};
use vz_spatial::SegmentIndex;

pub use join::JoinSummary;
pub use road::RoadFeatures;

/// Errors that can occur while building the canonical dataset.
#[derive(Debug, thiserror::Error)]
pub enum CanonError {
    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Event record error.
    #[error(transparent)]
    Record(#[from] vz_record::RecordError),

    /// Segment geometry error.
    #[error(transparent)]
    Spatial(#[from] vz_spatial::SpatialError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] vz_config::ConfigError),

    /// A requested road feature column is absent from a source table.
    #[error("Road feature {column} is missing from the {table} table")]
    MissingFeature {
        /// Requested feature column.
        column: String,
        /// Source table that lacks it.
        table: String,
    },

    /// A road feature value could not be read as a number.
    #[error("Segment {segment_id} has a non-numeric {column}: {value}")]
    NonNumericFeature {
        /// Segment carrying the value.
        segment_id: String,
        /// Feature column.
        column: String,
        /// The raw value.
        value: String,
    },

    /// An input file had an unexpected shape.
    #[error("Invalid input in {path}: {message}")]
    InvalidInput {
        /// File that was read.
        path: String,
        /// Description of what was wrong.
        message: String,
    },
}

/// Result of the join stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinReport {
    pub crashes: JoinSummary,
    /// `None` when the city has no concern data.
    pub concerns: Option<JoinSummary>,
    /// Number of distinct crash locations in the rollup.
    pub crash_locations: usize,
}

/// Result of the generate stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateSummary {
    /// Distinct segments in the panel.
    pub segments: usize,
    /// Rows written to the canonical dataset.
    pub rows: usize,
    /// Crashes counted into the panel.
    pub crashes: u64,
    /// Concerns counted into the panel.
    pub concerns: u64,
    /// Rows written to the adjacency table.
    pub adjacency_rows: usize,
}

/// Joins crashes (and concerns, when configured) to their nearest segment
/// and writes the joined files and the crash rollup.
///
/// # Errors
///
/// Returns an error if the segment maps or event files cannot be read, or
/// if any output cannot be written.
pub fn run_join(
    config: &Config,
    paths: &DataPaths,
    tolerance: Option<f64>,
) -> Result<JoinReport, CanonError> {
    let index = SegmentIndex::load(&[
        paths.inters_segments.as_path(),
        paths.non_inters_segments.as_path(),
    ])?;
    if index.is_empty() {
        log::warn!("No road segments were loaded; every event will be unmatched");
    }

    let (crash_records, crashes) = join::join_file(
        EventKind::Crash,
        &paths.standardized_crashes,
        &paths.crash_joined,
        &index,
        tolerance,
    )?;

    let rollups = vz_record::make_crash_rollup(&crash_records)?;
    join::write_rollup(&paths.crash_rollup, &rollups)?;

    let concerns = if config.has_concerns() {
        let (_, summary) = join::join_file(
            EventKind::Concern,
            &paths.standardized_concerns,
            &paths.concern_joined,
            &index,
            tolerance,
        )?;
        Some(summary)
    } else {
        log::info!("No concern files configured for {}; skipping concern join", config.name);
        None
    };

    Ok(JoinReport {
        crashes,
        concerns,
        crash_locations: rollups.len(),
    })
}

/// Builds the canonical dataset and adjacency table from the joined event
/// files and the road feature tables.
///
/// # Errors
///
/// Returns an error if any input cannot be read, an event has a missing or
/// malformed timestamp, a road feature is missing or non-numeric, or an
/// output cannot be written.
pub fn run_generate(
    config: &Config,
    paths: &DataPaths,
    window: DateWindow,
) -> Result<GenerateSummary, CanonError> {
    log_week_coverage(config.start_year, config.end_year);

    let crash_counts = vz_record::read_records(
        &paths.crash_joined,
        &CountOptions {
            date_field: &config.records.crash_date_field,
            id_field: &config.records.id_field,
            date_part: DatePart::Week,
            window,
        },
    )?;

    let concern_counts = if config.has_concerns() {
        vz_record::read_records(
            &paths.concern_joined,
            &CountOptions {
                date_field: &config.records.concern_date_field,
                id_field: &config.records.id_field,
                date_part: DatePart::Week,
                window,
            },
        )?
    } else {
        log::info!("No concern files configured for {}; concern counts are zero", config.name);
        BucketCounts::new()
    };

    let (features, pairs) = road::road_make(
        &config.features.columns,
        &paths.inters_data,
        &paths.non_inters_segments,
        config.features.reducer,
    )?;

    let counts = merge::combine_counts(&crash_counts, &concern_counts);
    let rows = merge::merge_canonical(&features, &counts);

    let segments = rows.len() / vz_record_models::WEEKS_PER_YEAR as usize;
    let crashes = rows.iter().map(|r| r.crash).sum();
    let concerns = rows.iter().map(|r| r.concern).sum();
    log::info!("Canonical panel: {segments} segments, {crashes} crashes, {concerns} concerns");

    output::write_canonical_gz(&paths.canonical_dataset, &features.columns, &rows)?;

    let atrs = output::read_atrs(&paths.snapped_atrs)?;
    let adjacency = output::build_adjacency(&pairs, &atrs);
    output::write_adjacency_file(&paths.adjacency, &adjacency)?;

    Ok(GenerateSummary {
        segments,
        rows: rows.len(),
        crashes,
        concerns,
        adjacency_rows: adjacency.len(),
    })
}

/// Logs how many ISO weeks each configured year actually has. The panel
/// always carries 53 week buckets.
fn log_week_coverage(start_year: Option<i32>, end_year: Option<i32>) {
    let (Some(start), Some(end)) = (start_year, end_year) else {
        return;
    };
    for year in start..end {
        let weeks = merge::iso_weeks_in_year(year);
        if weeks < vz_record_models::WEEKS_PER_YEAR {
            log::debug!("{year} has {weeks} ISO weeks; week 53 only collects early January events");
        }
    }
}
