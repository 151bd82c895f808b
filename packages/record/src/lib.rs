#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Crash and concern records.
//!
//! Wraps standardized point events with a projected location and a
//! timestamp accessor, counts events per segment and time bucket, and
//! builds the per-location and per-segment rollups.

pub mod counts;
pub mod parsing;
pub mod record;
pub mod rollup;

use std::io::{BufReader, BufWriter};
use std::path::Path;

pub use counts::{CountOptions, DateWindow, count_events, read_records};
pub use record::Record;
pub use rollup::{group_by_location, make_crash_rollup};

/// Errors that can occur while reading or aggregating event records.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// An event file did not contain a top-level JSON array.
    #[error("Expected a JSON array of records in {path}")]
    NotAnArray {
        /// File that was read.
        path: String,
    },

    /// A record was not a JSON object.
    #[error("Record {index} is not a JSON object")]
    NotAnObject {
        /// Position of the record in its file.
        index: usize,
    },

    /// A record had no usable `location`.
    #[error("Record has no valid location: {message}")]
    MissingLocation {
        /// Description of what was wrong.
        message: String,
    },

    /// A required field was missing from a record.
    #[error("Record {index} is missing field {field}")]
    MissingField {
        /// Position of the record in its file.
        index: usize,
        /// Name of the missing field.
        field: String,
    },

    /// A timestamp field could not be parsed as a date.
    #[error("Record {index} has an unparseable {field}: {value:?}")]
    Timestamp {
        /// Position of the record in its file.
        index: usize,
        /// Name of the timestamp field.
        field: String,
        /// The raw value.
        value: String,
    },
}

/// Reads a JSON array of event objects from a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid JSON, or is
/// not a top-level array.
pub fn read_event_values(path: &Path) -> Result<Vec<serde_json::Value>, RecordError> {
    let file = std::fs::File::open(path)?;
    let value: serde_json::Value = serde_json::from_reader(BufReader::new(file))?;
    match value {
        serde_json::Value::Array(records) => Ok(records),
        _ => Err(RecordError::NotAnArray {
            path: path.display().to_string(),
        }),
    }
}

/// Writes event objects as a JSON array, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_event_values(path: &Path, records: &[serde_json::Value]) -> Result<(), RecordError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), records)?;
    Ok(())
}
